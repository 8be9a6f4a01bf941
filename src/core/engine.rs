//! Storage engine
//!
//! Maps open files onto device frames and owns the power lifecycle. Every
//! frame transfer goes through the cache first; writes are write-through.
//!
//! A write rewrites the whole file: existing content is read back, the new
//! bytes are spliced in at the cursor, the old frames are released and the
//! content is stored again in the lowest free frames. Frames the file just
//! gave up are therefore reused before anything further along the device.

use crate::allocator::FrameTable;
use crate::cache::{CacheStats, FrameCache, MAX_CACHE_FRAMES};
use crate::config::CartConfig;
use crate::error::{CartError, Result};
use crate::files::{FileHandle, FileInfo, FileRegistry};
use crate::frame::{frames_for, pad_frame, FrameLocation};
use crate::opcode::{Command, Opcode, Register};
use crate::transport::{Response, Transport};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

/// Point-in-time engine statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageStats {
    pub powered_on: bool,
    pub total_frames: usize,
    pub free_frames: usize,
    pub used_frames: usize,
    pub open_files: usize,
    pub cache: Option<CacheStats>,
}

pub struct StorageEngine<T: Transport> {
    config: CartConfig,
    transport: T,
    /// Present only while powered on
    cache: Option<FrameCache>,
    files: FileRegistry,
    table: FrameTable,
    /// Cartridge the device last loaded successfully
    active_cartridge: Option<u16>,
    powered_on: bool,
}

impl<T: Transport> StorageEngine<T> {
    pub fn new(config: CartConfig, transport: T) -> Result<Self> {
        config.validate()?;
        let table = FrameTable::new(config.geometry);
        Ok(StorageEngine {
            config,
            transport,
            cache: None,
            files: FileRegistry::new(),
            table,
            active_cartridge: None,
            powered_on: false,
        })
    }

    pub fn config(&self) -> &CartConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn is_powered_on(&self) -> bool {
        self.powered_on
    }

    pub fn frame_table(&self) -> &FrameTable {
        &self.table
    }

    pub fn files(&self) -> &FileRegistry {
        &self.files
    }

    pub fn active_cartridge(&self) -> Option<u16> {
        self.active_cartridge
    }

    /// Change the cache size used by the next power on
    pub fn set_cache_capacity(&mut self, capacity: usize) -> Result<()> {
        if self.cache.is_some() {
            return Err(CartError::CacheAlreadyInitialized);
        }
        if capacity == 0 || capacity > MAX_CACHE_FRAMES {
            return Err(CartError::InvalidCacheSize(capacity));
        }
        self.config.cache.capacity = capacity;
        Ok(())
    }

    fn ensure_powered(&self) -> Result<()> {
        if !self.powered_on {
            return Err(CartError::NotPoweredOn);
        }
        Ok(())
    }

    /// Send one request and turn a RET=1 or mismatched response into an error
    fn execute(&mut self, opcode: Opcode, frame: Option<&[u8]>) -> Result<Response> {
        let command = opcode.command()?;
        let response = self.transport.send(opcode, frame)?;
        if response.opcode.decode(Register::Ky1) != command as u64 {
            error!(%command, response = %response.opcode, "Response does not echo the command");
            return Err(CartError::UnexpectedResponse {
                command,
                response: response.opcode.raw(),
            });
        }
        if !response.opcode.is_success() {
            error!(%command, response = %response.opcode, "Device reported failure");
            return Err(CartError::BackendFailure {
                command,
                response: response.opcode.raw(),
            });
        }
        Ok(response)
    }

    fn load_cartridge(&mut self, cartridge: u16) -> Result<()> {
        if self.active_cartridge == Some(cartridge) {
            return Ok(());
        }

        self.active_cartridge = None;
        self.execute(Opcode::build(Command::LoadCartridge, cartridge, 0), None)?;
        self.active_cartridge = Some(cartridge);
        trace!(cartridge, "Loaded cartridge");
        Ok(())
    }

    /// Fetch one frame, from the cache if possible
    fn read_frame(&mut self, location: FrameLocation) -> Result<Vec<u8>> {
        if let Some(cache) = self.cache.as_mut() {
            if let Some(frame) = cache.get(location) {
                trace!(%location, "Cache hit");
                return Ok(frame.to_vec());
            }
        }

        self.load_cartridge(location.cartridge)?;
        let response = self.execute(Opcode::build(Command::ReadFrame, 0, location.frame), None)?;

        let frame_size = self.config.geometry.frame_size;
        let frame = response.frame.unwrap_or_default();
        if frame.len() != frame_size {
            warn!(%location, "Read returned {} bytes", frame.len());
            return Err(CartError::UnexpectedPayload {
                expected: frame_size as u64,
                actual: frame.len() as u64,
            });
        }

        if let Some(cache) = self.cache.as_mut() {
            cache.put(location, &frame);
        }
        trace!(%location, "Read frame from device");
        Ok(frame)
    }

    /// Store one full frame on the device and in the cache
    fn write_frame(&mut self, location: FrameLocation, frame: &[u8]) -> Result<()> {
        self.load_cartridge(location.cartridge)?;
        self.execute(Opcode::build(Command::WriteFrame, 0, location.frame), Some(frame))?;

        if let Some(cache) = self.cache.as_mut() {
            cache.put(location, frame);
        }
        trace!(%location, "Wrote frame to device");
        Ok(())
    }

    fn invalidate(&mut self, location: FrameLocation) {
        if let Some(cache) = self.cache.as_mut() {
            cache.invalidate(location);
        }
    }

    /// Start the device and reset all in-memory state
    ///
    /// Initializes the device, then loads and zeroes every cartridge. On
    /// failure the cache is torn down and the engine stays powered off.
    pub fn poweron(&mut self) -> Result<()> {
        if self.powered_on {
            warn!("Power on requested while already powered on");
            return Err(CartError::AlreadyPoweredOn);
        }

        self.cache = Some(FrameCache::new(self.config.cache.capacity)?);
        self.files.reset();
        self.table.reset();
        self.active_cartridge = None;

        if let Err(e) = self.initialize_device() {
            error!("Power on failed: {}", e);
            self.cache = None;
            self.active_cartridge = None;
            return Err(e);
        }

        self.powered_on = true;
        info!(
            cartridges = self.config.geometry.max_cartridges,
            frames = self.table.total_frames(),
            cache = self.config.cache.capacity,
            "Storage powered on"
        );
        Ok(())
    }

    fn initialize_device(&mut self) -> Result<()> {
        self.execute(Opcode::build(Command::InitMs, 0, 0), None)?;

        for cartridge in 0..self.config.geometry.max_cartridges {
            let cartridge = cartridge as u16;
            self.load_cartridge(cartridge)?;
            self.execute(Opcode::build(Command::BZero, 0, 0), None)?;
        }
        Ok(())
    }

    /// Shut the device down and forget every file
    ///
    /// Local state is reset and the connection torn down even if the POWOFF
    /// request itself fails; that failure is still returned.
    pub fn poweroff(&mut self) -> Result<()> {
        if !self.powered_on {
            return Err(CartError::NotPoweredOn);
        }

        self.cache = None;
        self.files.reset();
        self.table.reset();
        self.active_cartridge = None;
        self.powered_on = false;

        let result = self
            .execute(Opcode::build(Command::PowerOff, 0, 0), None)
            .map(|_| ());
        self.transport.disconnect();

        match &result {
            Ok(()) => info!("Storage powered off"),
            Err(e) => error!("Power off request failed: {}", e),
        }
        result
    }

    /// Open a new empty file
    pub fn open(&mut self, name: &str) -> Result<FileHandle> {
        self.ensure_powered()?;
        let handle = self.files.open(name)?;
        debug!(%handle, name, "Opened file");
        Ok(handle)
    }

    /// Close a file, returning its frames to the free pool
    pub fn close(&mut self, handle: FileHandle) -> Result<()> {
        self.ensure_powered()?;
        let file = self.files.close(handle)?;

        let released = self.table.release_all(handle);
        if released != file.frames.len() {
            warn!(%handle, released, expected = file.frames.len(), "Frame count mismatch on close");
        }
        for &location in &file.frames {
            self.invalidate(location);
        }
        debug!(%handle, name = %file.name, frames = released, "Closed file");
        Ok(())
    }

    /// Read up to `buf.len()` bytes at the cursor
    ///
    /// Returns the number of bytes copied and advances the cursor by that
    /// much. A non-empty read with the cursor at the end of the file is
    /// [`CartError::EndOfFile`].
    pub fn read(&mut self, handle: FileHandle, buf: &mut [u8]) -> Result<usize> {
        self.ensure_powered()?;
        let frame_size = self.config.geometry.frame_size;

        let file = self.files.get(handle)?;
        let (position, length) = (file.position, file.length);
        if buf.is_empty() {
            return Ok(0);
        }
        if position >= length {
            return Err(CartError::EndOfFile);
        }

        let count = buf.len().min(length - position);
        let first = position / frame_size;
        let last = (position + count - 1) / frame_size;
        let covering = file.frames[first..=last].to_vec();

        let mut copied = 0;
        for (offset, location) in covering.into_iter().enumerate() {
            let frame = self.read_frame(location)?;
            let start = position + copied - (first + offset) * frame_size;
            let take = (frame_size - start).min(count - copied);
            buf[copied..copied + take].copy_from_slice(&frame[start..start + take]);
            copied += take;
        }

        self.files.get_mut(handle)?.position = position + count;
        debug!(%handle, position, count, "Read");
        Ok(count)
    }

    /// Write `data` at the cursor
    ///
    /// The file grows if the write extends past its end. The cursor ends up
    /// just past the written bytes. Either the whole write lands or the file
    /// keeps its previous length, cursor and frames.
    pub fn write(&mut self, handle: FileHandle, data: &[u8]) -> Result<usize> {
        self.ensure_powered()?;
        let frame_size = self.config.geometry.frame_size;

        let file = self.files.get(handle)?;
        let (position, length) = (file.position, file.length);
        let old_frames = file.frames.clone();
        if data.is_empty() {
            return Ok(0);
        }

        let new_length = length.max(position + data.len());
        let needed = frames_for(new_length, frame_size);
        if new_length > length {
            // Sized as if the bytes were appended, whatever the cursor
            let reserve = frames_for(length + data.len(), frame_size);
            let available = self.table.free_frames();
            if available < reserve {
                warn!(%handle, needed = reserve, available, "Not enough free frames for write");
                return Err(CartError::OutOfSpace {
                    needed: reserve,
                    available,
                });
            }
        }

        let mut content = Vec::with_capacity(needed * frame_size);
        for &location in &old_frames {
            content.extend_from_slice(&self.read_frame(location)?);
        }
        content.resize(length, 0);
        content.resize(new_length, 0);
        content[position..position + data.len()].copy_from_slice(data);

        for &location in &old_frames {
            self.table.release(location)?;
        }
        let targets: Vec<FrameLocation> = self.table.free_locations().take(needed).collect();

        let mut claimed = Vec::with_capacity(needed);
        let stored = if targets.len() < needed {
            Err(CartError::OutOfSpace {
                needed,
                available: targets.len(),
            })
        } else {
            self.store(handle, &content, &targets, &mut claimed)
        };

        if let Err(e) = stored {
            self.rollback(handle, &claimed, &old_frames);
            warn!(%handle, "Write failed, file unchanged: {}", e);
            return Err(e);
        }

        for &location in &old_frames {
            if !targets.contains(&location) {
                self.invalidate(location);
            }
        }

        let file = self.files.get_mut(handle)?;
        file.frames = targets;
        file.length = new_length;
        file.position = position + data.len();
        debug!(%handle, position, count = data.len(), length = new_length, "Wrote");
        Ok(data.len())
    }

    fn store(
        &mut self,
        handle: FileHandle,
        content: &[u8],
        targets: &[FrameLocation],
        claimed: &mut Vec<FrameLocation>,
    ) -> Result<()> {
        let frame_size = self.config.geometry.frame_size;
        for (chunk, &location) in content.chunks(frame_size).zip(targets) {
            self.table.claim(location, handle)?;
            claimed.push(location);
            self.write_frame(location, &pad_frame(chunk, frame_size))?;
        }
        Ok(())
    }

    /// Undo the ownership changes of a failed write
    fn rollback(&mut self, handle: FileHandle, claimed: &[FrameLocation], old_frames: &[FrameLocation]) {
        for &location in claimed {
            if let Err(e) = self.table.release(location) {
                warn!(%location, "Rollback release failed: {}", e);
            }
            self.invalidate(location);
        }
        for &location in old_frames {
            if let Err(e) = self.table.claim(location, handle) {
                warn!(%location, "Rollback reclaim failed: {}", e);
            }
            self.invalidate(location);
        }
    }

    /// Move the cursor to `offset`, which may be at most the file length
    pub fn seek(&mut self, handle: FileHandle, offset: usize) -> Result<()> {
        self.ensure_powered()?;
        let file = self.files.get_mut(handle)?;
        if offset > file.length {
            return Err(CartError::InvalidSeek {
                offset,
                length: file.length,
            });
        }
        file.position = offset;
        debug!(%handle, offset, "Seek");
        Ok(())
    }

    pub fn info(&self, handle: FileHandle) -> Result<FileInfo> {
        self.ensure_powered()?;
        self.files.info(handle)
    }

    pub fn lookup(&self, name: &str) -> Option<FileHandle> {
        self.files.lookup(name)
    }

    pub fn open_files(&self) -> Vec<FileInfo> {
        self.files
            .handles()
            .into_iter()
            .filter_map(|handle| self.files.info(handle).ok())
            .collect()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(FrameCache::stats)
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            powered_on: self.powered_on,
            total_frames: self.table.total_frames(),
            free_frames: self.table.free_frames(),
            used_frames: self.table.used_frames(),
            open_files: self.files.open_count(),
            cache: self.cache_stats(),
        }
    }
}
