//! Global frame ownership table
//!
//! One entry per frame on the device, in cartridge-major order:
//! - `None` = free frame
//! - `Some(handle)` = frame owned by that open file

use crate::config::Geometry;
use crate::error::{CartError, Result};
use crate::files::FileHandle;
use crate::frame::FrameLocation;

#[derive(Debug, Clone)]
pub struct FrameTable {
    geometry: Geometry,

    /// Owner of each frame, indexed by [`Geometry::index_of`]
    owners: Vec<Option<FileHandle>>,

    /// Number of free frames
    free: usize,
}

impl FrameTable {
    /// Create a table with every frame free
    pub fn new(geometry: Geometry) -> Self {
        let total = geometry.total_frames();
        FrameTable {
            geometry,
            owners: vec![None; total],
            free: total,
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn total_frames(&self) -> usize {
        self.owners.len()
    }

    pub fn free_frames(&self) -> usize {
        self.free
    }

    pub fn used_frames(&self) -> usize {
        self.owners.len() - self.free
    }

    fn index(&self, location: FrameLocation) -> Result<usize> {
        self.geometry
            .index_of(location)
            .ok_or(CartError::InvalidLocation {
                cartridge: location.cartridge,
                frame: location.frame,
            })
    }

    /// Current owner of a frame, `None` if free or out of range
    pub fn owner(&self, location: FrameLocation) -> Option<FileHandle> {
        self.geometry
            .index_of(location)
            .and_then(|idx| self.owners[idx])
    }

    /// Mark a free frame as owned by `handle`
    pub fn claim(&mut self, location: FrameLocation, handle: FileHandle) -> Result<()> {
        let idx = self.index(location)?;
        if self.owners[idx].is_some() {
            return Err(CartError::FrameAlreadyOwned(location));
        }

        self.owners[idx] = Some(handle);
        self.free -= 1;
        Ok(())
    }

    /// Return a frame to the free pool
    ///
    /// Returns the previous owner. Releasing a free frame is a no-op.
    pub fn release(&mut self, location: FrameLocation) -> Result<Option<FileHandle>> {
        let idx = self.index(location)?;
        let previous = self.owners[idx].take();
        match previous {
            Some(_) => self.free += 1,
            None => tracing::warn!(%location, "Release of a frame that is already free"),
        }
        Ok(previous)
    }

    /// All free locations in scan order
    pub fn free_locations(&self) -> impl Iterator<Item = FrameLocation> + '_ {
        self.owners
            .iter()
            .enumerate()
            .filter(|(_, owner)| owner.is_none())
            .map(|(idx, _)| self.geometry.location_at(idx))
    }

    /// Every location owned by `handle`, in scan order
    pub fn owned_by(&self, handle: FileHandle) -> Vec<FrameLocation> {
        self.owners
            .iter()
            .enumerate()
            .filter(|(_, owner)| **owner == Some(handle))
            .map(|(idx, _)| self.geometry.location_at(idx))
            .collect()
    }

    /// Release every frame owned by `handle`, returning how many were freed
    pub fn release_all(&mut self, handle: FileHandle) -> usize {
        let mut released = 0;
        for owner in self.owners.iter_mut() {
            if *owner == Some(handle) {
                *owner = None;
                released += 1;
            }
        }
        self.free += released;
        released
    }

    /// Mark every frame free
    pub fn reset(&mut self) {
        self.owners.iter_mut().for_each(|owner| *owner = None);
        self.free = self.owners.len();
    }
}
