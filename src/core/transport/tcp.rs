//! TCP client transport
//!
//! The connection is opened lazily by the first INITMS and closed after
//! POWOFF. Any other command while disconnected fails with
//! [`CartError::NotConnected`]. Nothing is retried and nothing reconnects
//! on its own: a socket that fails mid-exchange is dropped.

use super::{wire, Response, Transport};
use crate::config::NetworkConfig;
use crate::error::{CartError, Result};
use crate::frame::DEFAULT_FRAME_SIZE;
use crate::opcode::{Command, Opcode};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

pub struct TcpTransport {
    config: NetworkConfig,
    frame_size: usize,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(config: NetworkConfig, frame_size: usize) -> Self {
        TcpTransport {
            config,
            frame_size,
            stream: None,
        }
    }

    /// Client for `host:port` with default timeouts and frame size
    pub fn with_address(host: impl Into<String>, port: u16) -> Self {
        Self::new(NetworkConfig::with_address(host, port), DEFAULT_FRAME_SIZE)
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Address of the connected server
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    fn open(&self) -> Result<TcpStream> {
        let target = (self.config.host.as_str(), self.config.port);
        let mut last_err = None;

        for addr in target.to_socket_addrs()? {
            let attempt = match self.config.connect_timeout() {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    stream.set_read_timeout(self.config.read_timeout())?;
                    stream.set_write_timeout(self.config.write_timeout())?;
                    stream.set_nodelay(true)?;
                    tracing::info!(%addr, "Connected to cartridge server");
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        let err = last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address for {}:{}", self.config.host, self.config.port),
            )
        });
        tracing::error!(
            host = %self.config.host,
            port = self.config.port,
            "Connection to cartridge server failed: {}",
            err
        );
        Err(err.into())
    }

    fn exchange(
        &mut self,
        command: Command,
        opcode: Opcode,
        frame: Option<&[u8]>,
    ) -> Result<Response> {
        let stream = self.stream.as_mut().ok_or(CartError::NotConnected)?;
        wire::write_request(stream, opcode, frame)?;
        wire::read_response(stream, command, self.frame_size)
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, opcode: Opcode, frame: Option<&[u8]>) -> Result<Response> {
        let command = opcode.command()?;

        let payload = if command.sends_frame() {
            let frame = frame.unwrap_or(&[]);
            if frame.len() != self.frame_size {
                return Err(CartError::InvalidFrameSize {
                    expected: self.frame_size,
                    actual: frame.len(),
                });
            }
            Some(frame)
        } else {
            None
        };

        if command == Command::InitMs && self.stream.is_none() {
            self.stream = Some(self.open()?);
        }

        let response = match self.exchange(command, opcode, payload) {
            Ok(response) => response,
            Err(CartError::NotConnected) => {
                tracing::warn!(%command, "Request issued while disconnected");
                return Err(CartError::NotConnected);
            }
            Err(e) => {
                tracing::error!(%command, "Transport failure, dropping connection: {}", e);
                self.stream = None;
                return Err(e);
            }
        };

        tracing::trace!(%command, response = %response.opcode, "Exchange complete");

        if command == Command::PowerOff {
            self.disconnect();
        }
        Ok(response)
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            tracing::info!("Disconnected from cartridge server");
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_commands_before_init_are_rejected() {
        let mut transport = TcpTransport::with_address("127.0.0.1", 1);
        let result = transport.send(Opcode::build(Command::LoadCartridge, 0, 0), None);
        assert!(matches!(result, Err(CartError::NotConnected)));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_write_requires_full_frame() {
        let mut transport = TcpTransport::new(NetworkConfig::default(), 8);
        let result = transport.send(Opcode::build(Command::WriteFrame, 0, 0), Some(&[0u8; 4]));
        assert!(matches!(
            result,
            Err(CartError::InvalidFrameSize {
                expected: 8,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_init_fails_without_server() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut transport = TcpTransport::with_address("127.0.0.1", port);
        let result = transport.send(Opcode::build(Command::InitMs, 0, 0), None);
        assert!(matches!(result, Err(CartError::Io(_))));
        assert!(!transport.is_connected());
    }
}
