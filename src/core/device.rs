//! In-memory cartridge device
//!
//! Emulates the device behind the transport: a bank of cartridges, one of
//! which is active at a time. Frames are allocated on first write and read
//! back as zeros until then. Device-level failures (uninitialized device,
//! index out of range, no active cartridge) come back as a response with
//! RET set, exactly as a remote server would report them.

use crate::config::Geometry;
use crate::error::Result;
use crate::frame::FrameLocation;
use crate::opcode::{Command, Opcode};
use crate::transport::{Response, Transport};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Per-command request counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub inits: u64,
    pub loads: u64,
    pub zeroes: u64,
    pub reads: u64,
    pub writes: u64,
    pub power_offs: u64,
    /// Requests answered with RET set
    pub failures: u64,
}

pub struct MemoryCart {
    geometry: Geometry,
    frames: AHashMap<FrameLocation, Vec<u8>>,
    initialized: bool,
    active: Option<u16>,
    stats: DeviceStats,
    /// Countdown to an injected failure, per command
    faults: AHashMap<Command, u64>,
}

impl MemoryCart {
    pub fn new(geometry: Geometry) -> Self {
        MemoryCart {
            geometry,
            frames: AHashMap::new(),
            initialized: false,
            active: None,
            stats: DeviceStats::default(),
            faults: AHashMap::new(),
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn active_cartridge(&self) -> Option<u16> {
        self.active
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    /// Stored contents of a frame, `None` if never written since the last zero
    pub fn frame(&self, location: FrameLocation) -> Option<&[u8]> {
        self.frames.get(&location).map(Vec::as_slice)
    }

    /// Number of frames holding written data
    pub fn materialized_frames(&self) -> usize {
        self.frames.len()
    }

    /// Fail the `n`th upcoming request for `command` (1 = the next one)
    pub fn fail_nth(&mut self, command: Command, n: u64) {
        self.faults.insert(command, n.max(1));
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    fn injected_fault(&mut self, command: Command) -> bool {
        let Some(remaining) = self.faults.get_mut(&command) else {
            return false;
        };
        *remaining -= 1;
        if *remaining == 0 {
            self.faults.remove(&command);
            tracing::debug!(%command, "Injected device fault");
            return true;
        }
        false
    }

    fn fail(&mut self, opcode: Opcode, reason: &str) -> Response {
        tracing::debug!(%opcode, "Device failure: {}", reason);
        self.stats.failures += 1;
        Response::failure(opcode)
    }

    /// Location addressed by a frame command on the active cartridge
    fn addressed(&self, opcode: Opcode) -> std::result::Result<FrameLocation, &'static str> {
        let cartridge = self.active.ok_or("no cartridge loaded")?;
        let location = FrameLocation::new(cartridge, opcode.frame());
        if !self.geometry.contains(location) {
            return Err("frame index out of range");
        }
        Ok(location)
    }

    fn execute(&mut self, command: Command, opcode: Opcode, frame: Option<&[u8]>) -> Response {
        let ok = Response::new(opcode.with_ret(false));

        if command != Command::InitMs && !self.initialized {
            return self.fail(opcode, "device not initialized");
        }

        match command {
            Command::InitMs => {
                self.initialized = true;
                self.active = None;
                self.stats.inits += 1;
                ok
            }
            Command::LoadCartridge => {
                let cartridge = opcode.cartridge();
                if cartridge as usize >= self.geometry.max_cartridges {
                    return self.fail(opcode, "cartridge index out of range");
                }
                self.active = Some(cartridge);
                self.stats.loads += 1;
                ok
            }
            Command::BZero => {
                let Some(cartridge) = self.active else {
                    return self.fail(opcode, "no cartridge loaded");
                };
                self.frames.retain(|location, _| location.cartridge != cartridge);
                self.stats.zeroes += 1;
                ok
            }
            Command::ReadFrame => match self.addressed(opcode) {
                Ok(location) => {
                    let data = self
                        .frames
                        .get(&location)
                        .cloned()
                        .unwrap_or_else(|| vec![0u8; self.geometry.frame_size]);
                    self.stats.reads += 1;
                    Response::with_frame(opcode.with_ret(false), data)
                }
                Err(reason) => self.fail(opcode, reason),
            },
            Command::WriteFrame => {
                let location = match self.addressed(opcode) {
                    Ok(location) => location,
                    Err(reason) => return self.fail(opcode, reason),
                };
                match frame {
                    Some(data) if data.len() == self.geometry.frame_size => {
                        self.frames.insert(location, data.to_vec());
                        self.stats.writes += 1;
                        ok
                    }
                    _ => self.fail(opcode, "write without a full frame"),
                }
            }
            Command::PowerOff => {
                self.frames.clear();
                self.initialized = false;
                self.active = None;
                self.stats.power_offs += 1;
                ok
            }
        }
    }
}

impl Transport for MemoryCart {
    fn send(&mut self, opcode: Opcode, frame: Option<&[u8]>) -> Result<Response> {
        let command = match opcode.command() {
            Ok(command) => command,
            Err(_) => return Ok(self.fail(opcode, "unknown command")),
        };

        if self.injected_fault(command) {
            return Ok(self.fail(opcode, "injected fault"));
        }

        let response = self.execute(command, opcode, frame);
        tracing::trace!(%command, ret = response.opcode.ret(), "Device request");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> MemoryCart {
        MemoryCart::new(Geometry::new(2, 4, 8))
    }

    fn send(cart: &mut MemoryCart, command: Command, cartridge: u16, frame: u16) -> Response {
        cart.send(Opcode::build(command, cartridge, frame), None)
            .unwrap()
    }

    #[test]
    fn test_requires_init() {
        let mut cart = device();
        assert!(!send(&mut cart, Command::LoadCartridge, 0, 0).opcode.is_success());
        assert!(send(&mut cart, Command::InitMs, 0, 0).opcode.is_success());
        assert!(send(&mut cart, Command::LoadCartridge, 0, 0).opcode.is_success());
        assert_eq!(cart.active_cartridge(), Some(0));
    }

    #[test]
    fn test_frame_io_on_active_cartridge() {
        let mut cart = device();
        send(&mut cart, Command::InitMs, 0, 0);

        // No cartridge loaded yet
        assert!(!send(&mut cart, Command::ReadFrame, 0, 0).opcode.is_success());

        send(&mut cart, Command::LoadCartridge, 1, 0);
        let write = Opcode::build(Command::WriteFrame, 0, 3);
        assert!(cart.send(write, Some(&[9u8; 8])).unwrap().opcode.is_success());
        assert_eq!(cart.frame(FrameLocation::new(1, 3)), Some(&[9u8; 8][..]));

        let read = send(&mut cart, Command::ReadFrame, 0, 3);
        assert_eq!(read.frame, Some(vec![9u8; 8]));

        let unwritten = send(&mut cart, Command::ReadFrame, 0, 2);
        assert_eq!(unwritten.frame, Some(vec![0u8; 8]));
    }

    #[test]
    fn test_range_checks() {
        let mut cart = device();
        send(&mut cart, Command::InitMs, 0, 0);
        assert!(!send(&mut cart, Command::LoadCartridge, 2, 0).opcode.is_success());

        send(&mut cart, Command::LoadCartridge, 0, 0);
        assert!(!send(&mut cart, Command::ReadFrame, 0, 4).opcode.is_success());

        let short = cart
            .send(Opcode::build(Command::WriteFrame, 0, 0), Some(&[1u8; 3]))
            .unwrap();
        assert!(!short.opcode.is_success());
        assert_eq!(cart.stats().failures, 3);
    }

    #[test]
    fn test_bzero_clears_only_active_cartridge() {
        let mut cart = device();
        send(&mut cart, Command::InitMs, 0, 0);
        for cartridge in 0..2 {
            send(&mut cart, Command::LoadCartridge, cartridge, 0);
            cart.send(Opcode::build(Command::WriteFrame, 0, 0), Some(&[1u8; 8]))
                .unwrap();
        }

        send(&mut cart, Command::BZero, 0, 0);
        assert_eq!(cart.frame(FrameLocation::new(1, 0)), None);
        assert!(cart.frame(FrameLocation::new(0, 0)).is_some());
    }

    #[test]
    fn test_fault_injection() {
        let mut cart = device();
        send(&mut cart, Command::InitMs, 0, 0);
        cart.fail_nth(Command::LoadCartridge, 2);

        assert!(send(&mut cart, Command::LoadCartridge, 0, 0).opcode.is_success());
        assert!(!send(&mut cart, Command::LoadCartridge, 1, 0).opcode.is_success());
        assert!(send(&mut cart, Command::LoadCartridge, 1, 0).opcode.is_success());
    }

    #[test]
    fn test_power_off_resets() {
        let mut cart = device();
        send(&mut cart, Command::InitMs, 0, 0);
        send(&mut cart, Command::LoadCartridge, 0, 0);
        cart.send(Opcode::build(Command::WriteFrame, 0, 1), Some(&[5u8; 8]))
            .unwrap();

        assert!(send(&mut cart, Command::PowerOff, 0, 0).opcode.is_success());
        assert!(!cart.is_initialized());
        assert_eq!(cart.active_cartridge(), None);
        assert_eq!(cart.materialized_frames(), 0);
        assert_eq!(cart.stats().power_offs, 1);
    }

    #[test]
    fn test_unknown_command_fails() {
        let mut cart = device();
        let response = cart.send(Opcode::encode(9, 0, 0, 0, 0, 0), None).unwrap();
        assert!(!response.opcode.is_success());
    }
}
