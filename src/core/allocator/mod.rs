//! Frame allocation
//!
//! Storage is handed out one frame at a time from a global ownership table.
//! Free frames are always taken in cartridge-major scan order, so the lowest
//! free (cartridge, frame) pair is used first.

pub mod frame_table;

pub use frame_table::FrameTable;
