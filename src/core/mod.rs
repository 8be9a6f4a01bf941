//! Cartridge storage core
//!
//! The layers below are listed leaves first:
//!
//! - [`opcode`] - 64-bit command word packing/unpacking
//! - [`transport`] - request/response framing, TCP client, relay server
//! - [`device`] - in-process cartridge device emulator
//! - [`cache`] - fixed-capacity LRU frame cache
//! - [`allocator`] - frame ownership table
//! - [`files`] - open-file registry
//! - [`engine`] - file mapping and power lifecycle over all of the above
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ StorageEngine (open/read/write/seek)     │
//! ├──────────────┬───────────────────────────┤
//! │ FileRegistry │ FrameTable (cart × frame) │
//! ├──────────────┴───────────────────────────┤
//! │ FrameCache (hit) │ Transport (miss/write)│
//! ├──────────────────┴───────────────────────┤
//! │ Opcode: KY1|KY2|RET|CART|FRAME|RESV      │
//! └──────────────────────────────────────────┘
//! ```

pub mod allocator;
pub mod cache;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod files;
pub mod frame;
pub mod opcode;
pub mod transport;


pub use engine::{StorageEngine, StorageStats};
