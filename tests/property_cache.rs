//! Property-based tests for frame cache invariants

use cartdrive::{FrameCache, FrameLocation, MAX_CACHE_FRAMES};
use proptest::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Op {
    Put(FrameLocation, u8),
    Get(FrameLocation),
    Remove(FrameLocation),
}

fn location() -> impl Strategy<Value = FrameLocation> {
    (0u16..4, 0u16..24).prop_map(|(c, f)| FrameLocation::new(c, f))
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (location(), any::<u8>()).prop_map(|(l, b)| Op::Put(l, b)),
        2 => location().prop_map(Op::Get),
        1 => location().prop_map(Op::Remove),
    ]
}

proptest! {
    #[test]
    fn prop_cache_invariants_hold(
        capacity in 1usize..=MAX_CACHE_FRAMES,
        ops in prop::collection::vec(op(), 1..300)
    ) {
        let mut cache = FrameCache::new(capacity).unwrap();

        for op in ops {
            match op {
                Op::Put(location, byte) => {
                    cache.put(location, &[byte; 4]);
                    // The most recent insert is always resident with its new data
                    prop_assert_eq!(cache.get(location), Some(&[byte; 4][..]));
                }
                Op::Get(location) => {
                    let resident = cache.contains(location);
                    prop_assert_eq!(cache.get(location).is_some(), resident);
                }
                Op::Remove(location) => {
                    let resident = cache.contains(location);
                    prop_assert_eq!(cache.remove(location).is_some(), resident);
                    prop_assert!(!cache.contains(location));
                }
            }

            prop_assert!(cache.len() <= capacity);
            let tags: Vec<_> = cache.tags().collect();
            let unique: HashSet<_> = tags.iter().collect();
            prop_assert_eq!(tags.len(), unique.len());
        }
    }

    #[test]
    fn prop_lru_entry_is_evicted(capacity in 1usize..32, extra in 1usize..32) {
        let mut cache = FrameCache::new(capacity).unwrap();
        let total = capacity + extra;

        // Sequential inserts: only the newest `capacity` survive
        for i in 0..total {
            cache.put(FrameLocation::new(0, i as u16), &[i as u8]);
        }
        for i in 0..total {
            prop_assert_eq!(cache.contains(FrameLocation::new(0, i as u16)), i >= extra);
        }
        prop_assert_eq!(cache.stats().evictions, extra as u64);
    }
}
