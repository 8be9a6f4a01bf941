//! TCP relay server
//!
//! Accepts client connections and forwards every decoded request to an
//! inner [`Transport`], normally a [`MemoryCart`](crate::device::MemoryCart).
//! Connections are served one at a time, matching the single-client device.

use super::{wire, Response, Transport};
use crate::error::Result;
use crate::opcode::Command;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

pub struct CartServer<T: Transport> {
    listener: TcpListener,
    backend: T,
    frame_size: usize,
}

impl<T: Transport> CartServer<T> {
    pub fn bind<A: ToSocketAddrs>(addr: A, backend: T, frame_size: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        tracing::info!(addr = %listener.local_addr()?, "Cartridge server listening");
        Ok(CartServer {
            listener,
            backend,
            frame_size,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn backend(&self) -> &T {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut T {
        &mut self.backend
    }

    pub fn into_backend(self) -> T {
        self.backend
    }

    /// Accept and serve a single connection
    pub fn serve_one(&mut self) -> Result<()> {
        let (stream, peer) = self.listener.accept()?;
        tracing::info!(%peer, "Client connected");
        let result = self.serve_connection(stream);
        tracing::info!(%peer, "Client disconnected");
        result
    }

    /// Serve connections until the listener fails
    ///
    /// A failed connection is logged and does not stop the server.
    pub fn serve(&mut self) -> Result<()> {
        loop {
            if let Err(e) = self.serve_one() {
                tracing::warn!("Connection ended with error: {}", e);
            }
        }
    }

    /// Relay requests from one stream until EOF or POWOFF
    pub fn serve_connection(&mut self, mut stream: TcpStream) -> Result<()> {
        stream.set_nodelay(true)?;

        while let Some(request) = wire::read_request(&mut stream, self.frame_size)? {
            let command = request.opcode.command().ok();

            let response = match self.backend.send(request.opcode, request.frame.as_deref()) {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(opcode = %request.opcode, "Backend rejected request: {}", e);
                    Response::failure(request.opcode)
                }
            };
            wire::write_response(&mut stream, &response)?;

            if command == Some(Command::PowerOff) {
                tracing::debug!("Power off received, closing connection");
                break;
            }
        }
        Ok(())
    }
}
