//! Transport to the cartridge device
//!
//! The engine talks to the device through the [`Transport`] trait: one
//! opcode out, one opcode back, with at most one frame of payload in either
//! direction. Implementations:
//!
//! - [`TcpTransport`]: client for a remote cartridge server
//! - [`MemoryCart`](crate::device::MemoryCart): in-process emulator
//!
//! [`CartServer`] relays TCP requests to any other transport, which is how
//! an emulator is exposed over the network.

pub mod server;
pub mod tcp;
pub mod wire;

pub use server::CartServer;
pub use tcp::TcpTransport;

use crate::error::Result;
use crate::opcode::Opcode;

/// Device reply to one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub opcode: Opcode,
    /// Present only when the device returned a frame
    pub frame: Option<Vec<u8>>,
}

impl Response {
    pub fn new(opcode: Opcode) -> Self {
        Response {
            opcode,
            frame: None,
        }
    }

    pub fn with_frame(opcode: Opcode, frame: Vec<u8>) -> Self {
        Response {
            opcode,
            frame: Some(frame),
        }
    }

    /// Failure reply echoing `request` with RET set
    pub fn failure(request: Opcode) -> Self {
        Response::new(request.with_ret(true))
    }
}

/// Request/response channel to a cartridge device
///
/// `send` is synchronous: it returns once the full response has arrived.
/// Implementations never retry; any error is returned to the caller as is.
pub trait Transport {
    /// Send one request and wait for its response
    ///
    /// `frame` is only transmitted for commands that carry a payload.
    fn send(&mut self, opcode: Opcode, frame: Option<&[u8]>) -> Result<Response>;

    fn is_connected(&self) -> bool {
        true
    }

    /// Drop any underlying connection
    fn disconnect(&mut self) {}
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, opcode: Opcode, frame: Option<&[u8]>) -> Result<Response> {
        (**self).send(opcode, frame)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}
