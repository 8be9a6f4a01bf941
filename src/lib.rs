//! # cartdrive - File Storage over Networked Cartridges
//!
//! `cartdrive` stores named files on a cartridge device: a bank of
//! cartridges, each a fixed array of fixed-size frames, driven one 64-bit
//! opcode at a time over a request/response transport.
//!
//! - **File mapping**: open/read/write/seek/close over device frames
//! - **LRU frame cache**: write-through, bounded, never dirty
//! - **Opcode codec**: bit-packed command words in network byte order
//! - **TCP transport**: lazy connect, socket deadlines, no silent retries
//! - **In-memory device**: an emulator for tests and local runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cartdrive::{CartConfig, CartStorage, Result};
//!
//! # fn main() -> Result<()> {
//! // Talk to a cartridge server on 127.0.0.1:19876
//! let mut storage = CartStorage::connect(CartConfig::default())?;
//! storage.poweron()?;
//!
//! let file = storage.open("notes.txt")?;
//! storage.write(file, b"hello ")?;
//! storage.write(file, b"world")?;
//!
//! storage.seek(file, 0)?;
//! let content = storage.read_to_end(file)?;
//! assert_eq!(content, b"hello world");
//!
//! storage.poweroff()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Without a Server
//!
//! ```rust
//! use cartdrive::{CartConfig, CartStorage, Geometry};
//!
//! # fn main() -> cartdrive::Result<()> {
//! let mut config = CartConfig::default();
//! config.geometry = Geometry::new(4, 64, 256);
//!
//! let mut storage = CartStorage::in_memory(config)?;
//! storage.poweron()?;
//! let file = storage.open("data.bin")?;
//! storage.write(file, &[7u8; 1000])?;
//! assert_eq!(storage.stats().used_frames, 4);
//! # Ok(())
//! # }
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{
    allocator, cache, config, device, engine, error, files, frame, opcode, transport,
};

pub use crate::core::{
    allocator::FrameTable,
    cache::{CacheStats, FrameCache, MAX_CACHE_FRAMES},
    config::{CacheConfig, CartConfig, Geometry, NetworkConfig, MAX_TOTAL_FRAMES},
    device::{DeviceStats, MemoryCart},
    engine::{StorageEngine, StorageStats},
    error::{CartError, ErrorCategory, Result},
    files::{FileHandle, FileInfo},
    frame::{CacheTag, FrameLocation},
    opcode::{Command, Opcode, Register},
    transport::{CartServer, Response, TcpTransport, Transport},
};

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// High-level storage API
///
/// Wraps a [`StorageEngine`] with:
/// - Constructors for the TCP and in-memory devices
/// - Whole-file conveniences (`read_to_end`)
/// - Operation logging
///
/// Single-threaded; use [`SharedStorage`] to share one instance between
/// threads.
pub struct CartStorage<T: Transport = TcpTransport> {
    engine: StorageEngine<T>,
}

impl CartStorage<TcpTransport> {
    /// Storage backed by the cartridge server named in `config.network`
    ///
    /// No connection is made until [`CartStorage::poweron`].
    pub fn connect(config: CartConfig) -> Result<Self> {
        info!(
            host = %config.network.host,
            port = config.network.port,
            "Creating storage for remote cartridge server"
        );
        let transport = TcpTransport::new(config.network.clone(), config.geometry.frame_size);
        Self::with_transport(config, transport)
    }
}

impl CartStorage<MemoryCart> {
    /// Storage backed by an in-process device emulator
    pub fn in_memory(config: CartConfig) -> Result<Self> {
        info!("Creating storage over in-memory device");
        let device = MemoryCart::new(config.geometry);
        Self::with_transport(config, device)
    }
}

impl<T: Transport> CartStorage<T> {
    pub fn with_transport(config: CartConfig, transport: T) -> Result<Self> {
        Ok(CartStorage {
            engine: StorageEngine::new(config, transport)?,
        })
    }

    /// Initialize the device and reset all file state
    pub fn poweron(&mut self) -> Result<()> {
        self.engine.poweron()
    }

    /// Shut the device down; every open file is forgotten
    pub fn poweroff(&mut self) -> Result<()> {
        self.engine.poweroff()
    }

    pub fn is_powered_on(&self) -> bool {
        self.engine.is_powered_on()
    }

    /// Open a new, empty file
    pub fn open(&mut self, name: &str) -> Result<FileHandle> {
        self.engine.open(name)
    }

    /// Close a file and free its frames
    pub fn close(&mut self, handle: FileHandle) -> Result<()> {
        self.engine.close(handle)
    }

    /// Read at the cursor into `buf`, returning the byte count
    pub fn read(&mut self, handle: FileHandle, buf: &mut [u8]) -> Result<usize> {
        self.engine.read(handle, buf)
    }

    /// Write `data` at the cursor, returning the byte count
    ///
    /// Writes are all-or-nothing: on error the file is unchanged.
    pub fn write(&mut self, handle: FileHandle, data: &[u8]) -> Result<usize> {
        self.engine.write(handle, data)
    }

    /// Read from the cursor to the end of the file
    ///
    /// Returns an empty buffer if the cursor is already at the end.
    pub fn read_to_end(&mut self, handle: FileHandle) -> Result<Vec<u8>> {
        let info = self.engine.info(handle)?;
        let remaining = info.length - info.position;
        let mut buf = vec![0u8; remaining];
        if remaining > 0 {
            let count = self.engine.read(handle, &mut buf)?;
            buf.truncate(count);
        }
        debug!(%handle, bytes = buf.len(), "Read to end");
        Ok(buf)
    }

    pub fn seek(&mut self, handle: FileHandle, offset: usize) -> Result<()> {
        self.engine.seek(handle, offset)
    }

    pub fn info(&self, handle: FileHandle) -> Result<FileInfo> {
        self.engine.info(handle)
    }

    /// Handle of the open file called `name`
    pub fn lookup(&self, name: &str) -> Option<FileHandle> {
        self.engine.lookup(name)
    }

    pub fn open_files(&self) -> Vec<FileInfo> {
        self.engine.open_files()
    }

    pub fn stats(&self) -> StorageStats {
        self.engine.stats()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.engine.cache_stats()
    }

    /// Change the cache size; only allowed while powered off
    pub fn set_cache_capacity(&mut self, capacity: usize) -> Result<()> {
        self.engine.set_cache_capacity(capacity)
    }

    pub fn config(&self) -> &CartConfig {
        self.engine.config()
    }

    pub fn transport(&self) -> &T {
        self.engine.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.engine.transport_mut()
    }

    pub fn engine(&self) -> &StorageEngine<T> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut StorageEngine<T> {
        &mut self.engine
    }

    pub fn into_engine(self) -> StorageEngine<T> {
        self.engine
    }
}

/// Thread-safe handle to one [`CartStorage`]
///
/// Every call takes a single coarse lock for its whole duration, so
/// operations from different threads never interleave. Cloning is cheap.
pub struct SharedStorage<T: Transport = TcpTransport> {
    inner: Arc<Mutex<CartStorage<T>>>,
}

impl<T: Transport> Clone for SharedStorage<T> {
    fn clone(&self) -> Self {
        SharedStorage {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> SharedStorage<T> {
    pub fn new(storage: CartStorage<T>) -> Self {
        SharedStorage {
            inner: Arc::new(Mutex::new(storage)),
        }
    }

    /// Run `f` with exclusive access to the storage
    pub fn with<R>(&self, f: impl FnOnce(&mut CartStorage<T>) -> R) -> R {
        let mut storage = self.inner.lock();
        f(&mut storage)
    }

    pub fn poweron(&self) -> Result<()> {
        self.inner.lock().poweron()
    }

    pub fn poweroff(&self) -> Result<()> {
        self.inner.lock().poweroff()
    }

    pub fn open(&self, name: &str) -> Result<FileHandle> {
        self.inner.lock().open(name)
    }

    pub fn close(&self, handle: FileHandle) -> Result<()> {
        self.inner.lock().close(handle)
    }

    pub fn read(&self, handle: FileHandle, buf: &mut [u8]) -> Result<usize> {
        self.inner.lock().read(handle, buf)
    }

    pub fn write(&self, handle: FileHandle, data: &[u8]) -> Result<usize> {
        self.inner.lock().write(handle, data)
    }

    pub fn read_to_end(&self, handle: FileHandle) -> Result<Vec<u8>> {
        self.inner.lock().read_to_end(handle)
    }

    pub fn seek(&self, handle: FileHandle, offset: usize) -> Result<()> {
        self.inner.lock().seek(handle, offset)
    }

    pub fn info(&self, handle: FileHandle) -> Result<FileInfo> {
        self.inner.lock().info(handle)
    }

    pub fn stats(&self) -> StorageStats {
        self.inner.lock().stats()
    }
}
