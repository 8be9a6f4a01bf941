//! Open-file registry
//!
//! Files exist only while open: a name, a byte length, a cursor and the
//! ordered list of frames holding the content. Handles are slot indices and
//! a closed slot is reused by the next open.

use crate::error::{CartError, Result};
use crate::frame::FrameLocation;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of an open file in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileHandle(u32);

impl FileHandle {
    pub const fn from_raw(raw: u32) -> Self {
        FileHandle(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State of one open file
#[derive(Debug, Clone)]
pub(crate) struct OpenFile {
    pub name: String,
    pub length: usize,
    pub position: usize,
    /// Frames holding bytes `[i * frame_size, (i + 1) * frame_size)`
    pub frames: Vec<FrameLocation>,
}

impl OpenFile {
    fn new(name: String) -> Self {
        OpenFile {
            name,
            length: 0,
            position: 0,
            frames: Vec::new(),
        }
    }
}

/// Snapshot of an open file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub handle: FileHandle,
    pub name: String,
    pub length: usize,
    pub position: usize,
    pub frames: Vec<FrameLocation>,
}

#[derive(Debug, Clone)]
pub struct FileRegistry {
    slots: Vec<Option<OpenFile>>,
    names: AHashMap<String, FileHandle>,
}

impl Default for FileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FileRegistry {
    /// Registry with a single empty slot
    pub fn new() -> Self {
        FileRegistry {
            slots: vec![None],
            names: AHashMap::new(),
        }
    }

    /// Register a new empty file
    ///
    /// The lowest free slot is reused; the registry grows only when every
    /// slot is occupied.
    pub fn open(&mut self, name: &str) -> Result<FileHandle> {
        if name.is_empty() {
            return Err(CartError::InvalidPath);
        }
        if self.names.contains_key(name) {
            return Err(CartError::DuplicateFile(name.to_string()));
        }

        let index = match self.slots.iter().position(|slot| slot.is_none()) {
            Some(index) => index,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };

        let handle = FileHandle(index as u32);
        self.slots[index] = Some(OpenFile::new(name.to_string()));
        self.names.insert(name.to_string(), handle);
        Ok(handle)
    }

    /// Remove a file, returning its final state
    pub(crate) fn close(&mut self, handle: FileHandle) -> Result<OpenFile> {
        let file = self
            .slots
            .get_mut(handle.index())
            .and_then(Option::take)
            .ok_or(CartError::InvalidHandle(handle))?;
        self.names.remove(&file.name);
        Ok(file)
    }

    pub(crate) fn get(&self, handle: FileHandle) -> Result<&OpenFile> {
        self.slots
            .get(handle.index())
            .and_then(Option::as_ref)
            .ok_or(CartError::InvalidHandle(handle))
    }

    pub(crate) fn get_mut(&mut self, handle: FileHandle) -> Result<&mut OpenFile> {
        self.slots
            .get_mut(handle.index())
            .and_then(Option::as_mut)
            .ok_or(CartError::InvalidHandle(handle))
    }

    /// Handle of the open file called `name`
    pub fn lookup(&self, name: &str) -> Option<FileHandle> {
        self.names.get(name).copied()
    }

    pub fn info(&self, handle: FileHandle) -> Result<FileInfo> {
        let file = self.get(handle)?;
        Ok(FileInfo {
            handle,
            name: file.name.clone(),
            length: file.length,
            position: file.position,
            frames: file.frames.clone(),
        })
    }

    /// Handles of all open files, lowest first
    pub fn handles(&self) -> Vec<FileHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(idx, _)| FileHandle(idx as u32))
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.names.len()
    }

    /// Number of slots, open or not
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Forget every file and shrink back to one empty slot
    pub fn reset(&mut self) {
        self.slots.clear();
        self.slots.push(None);
        self.names.clear();
    }
}
