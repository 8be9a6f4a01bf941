//! Frame addressing
//!
//! A frame is the fixed-size unit of storage and transfer. Frames are
//! addressed by (cartridge, frame) pairs. The cache keys them by a 32-bit
//! tag with the cartridge index in bits 31..16 and the frame index in 15..0.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default frame size in bytes
pub const DEFAULT_FRAME_SIZE: usize = 1024;

/// Default number of addressable cartridges
pub const DEFAULT_MAX_CARTRIDGES: usize = 64;

/// Default number of frames per cartridge
pub const DEFAULT_CARTRIDGE_SIZE: usize = 1024;

/// Position of one frame on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameLocation {
    pub cartridge: u16,
    pub frame: u16,
}

impl FrameLocation {
    pub const fn new(cartridge: u16, frame: u16) -> Self {
        FrameLocation { cartridge, frame }
    }

    /// Cache tag for this location
    pub const fn tag(self) -> CacheTag {
        CacheTag(((self.cartridge as u32) << 16) | self.frame as u32)
    }
}

impl fmt::Display for FrameLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cartridge, self.frame)
    }
}

/// Bijective 32-bit encoding of a [`FrameLocation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheTag(u32);

impl CacheTag {
    pub const fn from_raw(raw: u32) -> Self {
        CacheTag(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn location(self) -> FrameLocation {
        FrameLocation {
            cartridge: (self.0 >> 16) as u16,
            frame: (self.0 & 0xFFFF) as u16,
        }
    }
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Number of frames needed to hold `bytes` bytes
pub fn frames_for(bytes: usize, frame_size: usize) -> usize {
    bytes.div_ceil(frame_size)
}

/// Copy `chunk` into a fresh zero-filled frame
///
/// The tail of a short chunk stays zero, never residue from a previous frame.
pub fn pad_frame(chunk: &[u8], frame_size: usize) -> Vec<u8> {
    let mut frame = vec![0u8; frame_size];
    let len = chunk.len().min(frame_size);
    frame[..len].copy_from_slice(&chunk[..len]);
    frame
}
