use crate::files::FileHandle;
use crate::frame::FrameLocation;
use crate::opcode::Command;
use thiserror::Error;

/// Broad failure classes
///
/// Every [`CartError`] falls into exactly one of these. Nothing in the stack
/// retries on any of them; retry policy belongs to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Illegal argument, rejected before any I/O
    Validation,
    /// Operation not allowed in the current state
    State,
    /// Not enough cache slots or free frames
    Capacity,
    /// Connection, framing or backend-reported failure
    Transport,
}

#[derive(Error, Debug)]
pub enum CartError {
    #[error("Invalid path: file name must not be empty")]
    InvalidPath,

    #[error("File already open: {0}")]
    DuplicateFile(String),

    #[error("Invalid seek to {offset} (file length {length})")]
    InvalidSeek { offset: usize, length: usize },

    #[error("Invalid opcode register tag: {0}")]
    InvalidRegister(u8),

    #[error("Invalid command code: {0}")]
    InvalidCommand(u8),

    #[error("Frame location {cartridge}:{frame} is outside the configured geometry")]
    InvalidLocation { cartridge: u16, frame: u16 },

    #[error("Invalid frame size: expected {expected} bytes, got {actual}")]
    InvalidFrameSize { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid or closed file handle: {0}")]
    InvalidHandle(FileHandle),

    #[error("Storage is not powered on")]
    NotPoweredOn,

    #[error("Storage is already powered on")]
    AlreadyPoweredOn,

    #[error("Frame cache is already initialized")]
    CacheAlreadyInitialized,

    #[error("Transport is not connected")]
    NotConnected,

    #[error("End of file")]
    EndOfFile,

    #[error("Invalid cache size: {0} (must be 1..={max})", max = crate::cache::MAX_CACHE_FRAMES)]
    InvalidCacheSize(usize),

    #[error("Out of space: {needed} frames needed, {available} available")]
    OutOfSpace { needed: usize, available: usize },

    #[error("Frame already owned: {0}")]
    FrameAlreadyOwned(FrameLocation),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },

    #[error("Unexpected payload length: expected {expected} bytes, got {actual}")]
    UnexpectedPayload { expected: u64, actual: u64 },

    #[error("Backend reported failure for {command} (response {response:#018x})")]
    BackendFailure { command: Command, response: u64 },

    #[error("Response {response:#018x} does not answer {command}")]
    UnexpectedResponse { command: Command, response: u64 },
}

impl CartError {
    /// Which failure class this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            CartError::InvalidPath
            | CartError::DuplicateFile(_)
            | CartError::InvalidSeek { .. }
            | CartError::InvalidRegister(_)
            | CartError::InvalidCommand(_)
            | CartError::InvalidLocation { .. }
            | CartError::InvalidFrameSize { .. }
            | CartError::Config(_) => ErrorCategory::Validation,

            CartError::InvalidHandle(_)
            | CartError::NotPoweredOn
            | CartError::AlreadyPoweredOn
            | CartError::CacheAlreadyInitialized
            | CartError::NotConnected
            | CartError::EndOfFile => ErrorCategory::State,

            CartError::InvalidCacheSize(_)
            | CartError::OutOfSpace { .. }
            | CartError::FrameAlreadyOwned(_) => ErrorCategory::Capacity,

            CartError::Io(_)
            | CartError::ShortTransfer { .. }
            | CartError::UnexpectedPayload { .. }
            | CartError::BackendFailure { .. }
            | CartError::UnexpectedResponse { .. } => ErrorCategory::Transport,
        }
    }
}

pub type Result<T> = std::result::Result<T, CartError>;
