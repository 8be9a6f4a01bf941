//! Request/response framing
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────────────────┐
//! │ opcode (u64) │ length (u64) │ payload (length B)  │
//! └──────────────┴──────────────┴─────────────────────┘
//! ```
//!
//! Both integers are big-endian. `length` is either 0 or exactly one frame,
//! and only WRFRME requests and RDFRME responses carry a frame.

use super::Response;
use crate::error::{CartError, Result};
use crate::opcode::{Command, Opcode};
use std::io::{ErrorKind, Read, Write};

const HEADER_SIZE: usize = 16;

/// Decoded request as seen by a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub opcode: Opcode,
    pub frame: Option<Vec<u8>>,
}

fn encode(opcode: Opcode, payload: Option<&[u8]>) -> Vec<u8> {
    let payload = payload.unwrap_or(&[]);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&opcode.to_be_bytes());
    buf.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Fill `buf` from `reader`, returning how many bytes arrived before EOF
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let actual = read_full(reader, buf)?;
    if actual != buf.len() {
        return Err(CartError::ShortTransfer {
            expected: buf.len(),
            actual,
        });
    }
    Ok(())
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut bytes = [0u8; 8];
    read_exact(reader, &mut bytes)?;
    Ok(u64::from_be_bytes(bytes))
}

/// Read a payload whose declared length must be 0 or `frame_size`
fn read_payload<R: Read>(reader: &mut R, length: u64, frame_size: usize) -> Result<Option<Vec<u8>>> {
    if length == 0 {
        return Ok(None);
    }
    if length != frame_size as u64 {
        return Err(CartError::UnexpectedPayload {
            expected: frame_size as u64,
            actual: length,
        });
    }

    let mut frame = vec![0u8; frame_size];
    read_exact(reader, &mut frame)?;
    Ok(Some(frame))
}

/// Send one request in a single write
pub fn write_request<W: Write>(writer: &mut W, opcode: Opcode, frame: Option<&[u8]>) -> Result<()> {
    writer.write_all(&encode(opcode, frame))?;
    writer.flush()?;
    Ok(())
}

/// Read one request
///
/// Returns `None` if the peer closed the stream cleanly between requests.
pub fn read_request<R: Read>(reader: &mut R, frame_size: usize) -> Result<Option<Request>> {
    let mut bytes = [0u8; 8];
    match read_full(reader, &mut bytes)? {
        0 => return Ok(None),
        8 => {}
        actual => return Err(CartError::ShortTransfer { expected: 8, actual }),
    }

    let opcode = Opcode::from_be_bytes(bytes);
    let length = read_u64(reader)?;
    let frame = read_payload(reader, length, frame_size)?;
    Ok(Some(Request { opcode, frame }))
}

pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    writer.write_all(&encode(response.opcode, response.frame.as_deref()))?;
    writer.flush()?;
    Ok(())
}

/// Read the response to a `command` request
pub fn read_response<R: Read>(
    reader: &mut R,
    command: Command,
    frame_size: usize,
) -> Result<Response> {
    let opcode = Opcode::from_raw(read_u64(reader)?);
    let length = read_u64(reader)?;
    if length != 0 && !command.returns_frame() {
        return Err(CartError::UnexpectedPayload {
            expected: 0,
            actual: length,
        });
    }
    let frame = read_payload(reader, length, frame_size)?;
    Ok(Response { opcode, frame })
}
