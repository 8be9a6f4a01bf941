//! LRU frame cache
//!
//! Fixed array of slots, each holding one frame keyed by its [`CacheTag`].
//! A logical clock ticks on every cache operation (put, get, remove); hits and
//! inserts stamp the slot with the current clock value. When all slots are
//! occupied, `put` evicts the slot with the smallest stamp, lowest slot index
//! first on ties.
//!
//! The cache is write-through only: it never holds data the device does not
//! already have, so it carries no dirty state and never writes back.

use crate::error::{CartError, Result};
use crate::frame::{CacheTag, FrameLocation};
use serde::{Deserialize, Serialize};

/// Hard ceiling on cache capacity
pub const MAX_CACHE_FRAMES: usize = 128;

#[derive(Debug, Clone)]
struct CacheEntry {
    tag: CacheTag,
    frame: Vec<u8>,
    recency: u64,
}

/// Frame cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub occupied: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

pub struct FrameCache {
    slots: Vec<Option<CacheEntry>>,
    clock: u64,
    /// Copy of the most recently removed frame
    overflow: Option<Vec<u8>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl FrameCache {
    /// Create a cache with `capacity` slots
    ///
    /// Capacity must be in `1..=MAX_CACHE_FRAMES` and is fixed for the
    /// lifetime of the cache.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > MAX_CACHE_FRAMES {
            tracing::error!("Illegal cache size requested: {}", capacity);
            return Err(CartError::InvalidCacheSize(capacity));
        }

        Ok(FrameCache {
            slots: vec![None; capacity],
            clock: 0,
            overflow: None,
            hits: 0,
            misses: 0,
            evictions: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_none())
    }

    /// Current value of the logical clock
    pub fn clock(&self) -> u64 {
        self.clock
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn position(&self, tag: CacheTag) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(entry) if entry.tag == tag))
    }

    /// Slot holding the least recently used entry
    fn lru_slot(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|entry| (idx, entry.recency)))
            .min_by_key(|&(_, recency)| recency)
            .map(|(idx, _)| idx)
    }

    /// Insert a frame, evicting the LRU entry if every slot is taken
    ///
    /// If the location is already cached its slot is overwritten in place, so
    /// a tag never occupies two slots.
    pub fn put(&mut self, location: FrameLocation, frame: &[u8]) {
        self.tick();
        let tag = location.tag();

        let slot = match self.position(tag) {
            Some(idx) => idx,
            None => match self.slots.iter().position(|slot| slot.is_none()) {
                Some(idx) => idx,
                None => self.evict(),
            },
        };

        self.slots[slot] = Some(CacheEntry {
            tag,
            frame: frame.to_vec(),
            recency: self.clock,
        });
        tracing::trace!(%location, slot, "Cached frame");
    }

    /// Remove the LRU entry and return the slot it occupied
    fn evict(&mut self) -> usize {
        let slot = self.lru_slot().unwrap_or(0);
        if let Some(location) = self.slots[slot].as_ref().map(|e| e.tag.location()) {
            tracing::debug!(%location, slot, "Evicting least recently used frame");
            self.remove(location);
            self.evictions += 1;
        }
        slot
    }

    /// Look up a frame
    ///
    /// A hit refreshes the entry's recency. A miss returns `None` and the
    /// caller falls through to the device.
    pub fn get(&mut self, location: FrameLocation) -> Option<&[u8]> {
        let now = self.tick();
        match self.position(location.tag()) {
            Some(idx) => {
                self.hits += 1;
                let entry = self.slots[idx].as_mut()?;
                entry.recency = now;
                Some(entry.frame.as_slice())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Remove a frame and return its bytes
    ///
    /// The removed bytes are also kept in the single-slot overflow buffer
    /// (see [`FrameCache::last_evicted`]).
    pub fn remove(&mut self, location: FrameLocation) -> Option<Vec<u8>> {
        self.tick();
        let Some(idx) = self.position(location.tag()) else {
            tracing::debug!(%location, "Frame not in cache, nothing to remove");
            return None;
        };

        let entry = self.slots[idx].take()?;
        self.overflow = Some(entry.frame.clone());
        Some(entry.frame)
    }

    /// Drop a frame without touching the overflow buffer
    pub fn invalidate(&mut self, location: FrameLocation) -> bool {
        self.tick();
        match self.position(location.tag()) {
            Some(idx) => {
                self.slots[idx] = None;
                true
            }
            None => false,
        }
    }

    /// Check residency without counting as an access
    pub fn contains(&self, location: FrameLocation) -> bool {
        self.position(location.tag()).is_some()
    }

    /// Last frame removed from the cache, if any
    pub fn last_evicted(&self) -> Option<&[u8]> {
        self.overflow.as_deref()
    }

    /// Tags of all occupied slots, in slot order
    pub fn tags(&self) -> impl Iterator<Item = CacheTag> + '_ {
        self.slots.iter().flatten().map(|entry| entry.tag)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            occupied: self.len(),
            capacity: self.capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn loc(frame: u16) -> FrameLocation {
        FrameLocation::new(0, frame)
    }

    fn frame_of(byte: u8) -> Vec<u8> {
        vec![byte; 16]
    }

    #[test]
    fn test_capacity_bounds() {
        assert!(matches!(FrameCache::new(0), Err(CartError::InvalidCacheSize(0))));
        assert!(matches!(
            FrameCache::new(MAX_CACHE_FRAMES + 1),
            Err(CartError::InvalidCacheSize(129))
        ));
        assert_eq!(FrameCache::new(1).unwrap().capacity(), 1);
        assert_eq!(
            FrameCache::new(MAX_CACHE_FRAMES).unwrap().capacity(),
            MAX_CACHE_FRAMES
        );
    }

    #[test]
    fn test_put_get() {
        let mut cache = FrameCache::new(4).unwrap();
        cache.put(loc(1), &frame_of(1));

        assert_eq!(cache.get(loc(1)), Some(&frame_of(1)[..]));
        assert_eq!(cache.get(loc(2)), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.occupied, 1);
    }

    #[test]
    fn test_clock_ticks_on_every_operation() {
        let mut cache = FrameCache::new(2).unwrap();
        cache.put(loc(1), &frame_of(1));
        assert_eq!(cache.clock(), 1);
        cache.get(loc(9));
        assert_eq!(cache.clock(), 2);
        cache.get(loc(1));
        assert_eq!(cache.clock(), 3);
        cache.remove(loc(9));
        assert_eq!(cache.clock(), 4);
    }

    #[test]
    fn test_evicts_oldest_insert() {
        let mut cache = FrameCache::new(3).unwrap();
        for i in 0..4 {
            cache.put(loc(i), &frame_of(i as u8));
        }

        assert!(!cache.contains(loc(0)));
        for i in 1..4 {
            assert!(cache.contains(loc(i)));
        }
        assert_eq!(cache.last_evicted(), Some(&frame_of(0)[..]));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let mut cache = FrameCache::new(3).unwrap();
        cache.put(loc(0), &frame_of(0));
        cache.put(loc(1), &frame_of(1));
        cache.put(loc(2), &frame_of(2));

        // Touch 0 so 1 becomes the LRU entry
        assert!(cache.get(loc(0)).is_some());
        cache.put(loc(3), &frame_of(3));

        assert!(cache.contains(loc(0)));
        assert!(!cache.contains(loc(1)));
        assert!(cache.contains(loc(2)));
        assert!(cache.contains(loc(3)));
    }

    #[test]
    fn test_put_existing_tag_replaces_in_place() {
        let mut cache = FrameCache::new(2).unwrap();
        cache.put(loc(5), &frame_of(1));
        cache.put(loc(5), &frame_of(2));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(loc(5)), Some(&frame_of(2)[..]));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_remove_frees_slot() {
        let mut cache = FrameCache::new(1).unwrap();
        cache.put(loc(1), &frame_of(7));

        assert_eq!(cache.remove(loc(1)), Some(frame_of(7)));
        assert_eq!(cache.remove(loc(1)), None);
        assert!(cache.is_empty());

        // Freed slot is reused without eviction
        cache.put(loc(2), &frame_of(8));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_invalidate_keeps_overflow() {
        let mut cache = FrameCache::new(2).unwrap();
        cache.put(loc(1), &frame_of(1));
        cache.remove(loc(1));
        cache.put(loc(2), &frame_of(2));

        assert!(cache.invalidate(loc(2)));
        assert!(!cache.invalidate(loc(2)));
        assert_eq!(cache.last_evicted(), Some(&frame_of(1)[..]));
    }

    #[test]
    fn test_tags_stay_unique_under_pressure() {
        let mut cache = FrameCache::new(8).unwrap();
        for i in 0..200u16 {
            cache.put(FrameLocation::new(i % 3, i % 17), &frame_of(i as u8));
            assert!(cache.len() <= 8);
        }

        let tags: Vec<_> = cache.tags().collect();
        let unique: HashSet<_> = tags.iter().collect();
        assert_eq!(tags.len(), unique.len());
    }

    #[test]
    fn test_hit_rate_calculation() {
        let mut cache = FrameCache::new(4).unwrap();
        cache.put(loc(1), &frame_of(1));

        cache.get(loc(1)); // Hit
        cache.get(loc(2)); // Miss
        cache.get(loc(1)); // Hit

        let stats = cache.stats();
        assert!((stats.hit_rate() - 66.66).abs() < 0.1);
    }
}
