//! Cartridge opcode codec
//!
//! Every request and response starts with one 64-bit opcode word:
//!
//! ```text
//!  63    56 55    48  47  46          31 30          15 14         0
//! ┌────────┬────────┬───┬──────────────┬──────────────┬────────────┐
//! │  KY1   │  KY2   │RET│     CART     │    FRAME     │    RESV    │
//! └────────┴────────┴───┴──────────────┴──────────────┴────────────┘
//! ```
//!
//! The word is built with shifts and masks, so the layout does not depend on
//! host byte order. On the wire it is sent big-endian.

use crate::error::{CartError, Result};
use std::fmt;

/// Command selector carried in KY1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Initialize the device
    InitMs = 0,
    /// Zero every frame of the active cartridge
    BZero = 1,
    /// Make a cartridge the active one
    LoadCartridge = 2,
    /// Read one frame of the active cartridge
    ReadFrame = 3,
    /// Write one frame of the active cartridge
    WriteFrame = 4,
    /// Shut the device down
    PowerOff = 5,
}

impl Command {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Command::InitMs),
            1 => Ok(Command::BZero),
            2 => Ok(Command::LoadCartridge),
            3 => Ok(Command::ReadFrame),
            4 => Ok(Command::WriteFrame),
            5 => Ok(Command::PowerOff),
            _ => Err(CartError::InvalidCommand(value)),
        }
    }

    /// Whether a request for this command carries one frame of payload
    pub fn sends_frame(self) -> bool {
        matches!(self, Command::WriteFrame)
    }

    /// Whether a successful response to this command carries one frame
    pub fn returns_frame(self) -> bool {
        matches!(self, Command::ReadFrame)
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::InitMs => "INITMS",
            Command::BZero => "BZERO",
            Command::LoadCartridge => "LDCART",
            Command::ReadFrame => "RDFRME",
            Command::WriteFrame => "WRFRME",
            Command::PowerOff => "POWOFF",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named field of an opcode word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Register {
    Ky1 = 0,
    Ky2 = 1,
    Ret = 2,
    Cartridge = 3,
    Frame = 4,
    Reserved = 5,
}

impl Register {
    pub const ALL: [Register; 6] = [
        Register::Ky1,
        Register::Ky2,
        Register::Ret,
        Register::Cartridge,
        Register::Frame,
        Register::Reserved,
    ];

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Register::Ky1),
            1 => Ok(Register::Ky2),
            2 => Ok(Register::Ret),
            3 => Ok(Register::Cartridge),
            4 => Ok(Register::Frame),
            5 => Ok(Register::Reserved),
            _ => Err(CartError::InvalidRegister(value)),
        }
    }

    /// Bit offset of the field's least significant bit
    pub const fn shift(self) -> u32 {
        match self {
            Register::Ky1 => 56,
            Register::Ky2 => 48,
            Register::Ret => 47,
            Register::Cartridge => 31,
            Register::Frame => 15,
            Register::Reserved => 0,
        }
    }

    pub const fn width(self) -> u32 {
        match self {
            Register::Ky1 | Register::Ky2 => 8,
            Register::Ret => 1,
            Register::Cartridge | Register::Frame => 16,
            Register::Reserved => 15,
        }
    }

    pub const fn mask(self) -> u64 {
        (1u64 << self.width()) - 1
    }
}

/// One packed 64-bit command/response word
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Opcode(u64);

impl Opcode {
    /// Pack six raw field values
    ///
    /// No bounds checking: a value wider than its field spills into the
    /// neighbouring fields. Callers validate indices beforehand.
    pub const fn encode(ky1: u64, ky2: u64, ret: u64, cart: u64, frame: u64, resv: u64) -> Self {
        Opcode(
            (ky1 << Register::Ky1.shift())
                | (ky2 << Register::Ky2.shift())
                | (ret << Register::Ret.shift())
                | (cart << Register::Cartridge.shift())
                | (frame << Register::Frame.shift())
                | resv,
        )
    }

    /// Request word for `command` addressing `cartridge`/`frame`
    pub const fn build(command: Command, cartridge: u16, frame: u16) -> Self {
        Opcode::encode(command as u64, 0, 0, cartridge as u64, frame as u64, 0)
    }

    pub const fn from_raw(raw: u64) -> Self {
        Opcode(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Extract one field
    pub const fn decode(self, register: Register) -> u64 {
        (self.0 >> register.shift()) & register.mask()
    }

    /// Extract one field by its numeric tag
    pub fn decode_tag(self, tag: u8) -> Result<u64> {
        Ok(self.decode(Register::from_u8(tag)?))
    }

    pub fn command(self) -> Result<Command> {
        Command::from_u8(self.decode(Register::Ky1) as u8)
    }

    pub const fn ret(self) -> u64 {
        self.decode(Register::Ret)
    }

    pub const fn is_success(self) -> bool {
        self.ret() == 0
    }

    pub const fn cartridge(self) -> u16 {
        self.decode(Register::Cartridge) as u16
    }

    pub const fn frame(self) -> u16 {
        self.decode(Register::Frame) as u16
    }

    /// Copy of this word with the RET bit set to `failed`
    pub const fn with_ret(self, failed: bool) -> Self {
        let cleared = self.0 & !(Register::Ret.mask() << Register::Ret.shift());
        Opcode(cleared | ((failed as u64) << Register::Ret.shift()))
    }

    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub const fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Opcode(u64::from_be_bytes(bytes))
    }
}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opcode")
            .field("ky1", &self.decode(Register::Ky1))
            .field("ky2", &self.decode(Register::Ky2))
            .field("ret", &self.ret())
            .field("cart", &self.cartridge())
            .field("frame", &self.frame())
            .field("resv", &self.decode(Register::Reserved))
            .finish()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_offsets() {
        assert_eq!(Opcode::encode(0xFF, 0, 0, 0, 0, 0).raw(), 0xFF00_0000_0000_0000);
        assert_eq!(Opcode::encode(0, 0xFF, 0, 0, 0, 0).raw(), 0x00FF_0000_0000_0000);
        assert_eq!(Opcode::encode(0, 0, 1, 0, 0, 0).raw(), 0x0000_8000_0000_0000);
        assert_eq!(Opcode::encode(0, 0, 0, 0xFFFF, 0, 0).raw(), 0x0000_7FFF_8000_0000);
        assert_eq!(Opcode::encode(0, 0, 0, 0, 0xFFFF, 0).raw(), 0x0000_0000_7FFF_8000);
        assert_eq!(Opcode::encode(0, 0, 0, 0, 0, 0x7FFF).raw(), 0x0000_0000_0000_7FFF);
    }

    #[test]
    fn test_decode_each_field() {
        let op = Opcode::encode(4, 9, 1, 1234, 777, 42);
        assert_eq!(op.decode(Register::Ky1), 4);
        assert_eq!(op.decode(Register::Ky2), 9);
        assert_eq!(op.decode(Register::Ret), 1);
        assert_eq!(op.decode(Register::Cartridge), 1234);
        assert_eq!(op.decode(Register::Frame), 777);
        assert_eq!(op.decode(Register::Reserved), 42);
        assert_eq!(op.command().unwrap(), Command::WriteFrame);
    }

    #[test]
    fn test_overflow_corrupts_neighbour() {
        // A 17-bit frame value spills its top bit into the cartridge field
        let op = Opcode::encode(0, 0, 0, 0, 0x1_0000, 0);
        assert_eq!(op.frame(), 0);
        assert_eq!(op.cartridge(), 1);
    }

    #[test]
    fn test_unknown_tags_rejected() {
        let op = Opcode::build(Command::InitMs, 0, 0);
        assert!(matches!(op.decode_tag(6), Err(CartError::InvalidRegister(6))));
        assert_eq!(op.decode_tag(0).unwrap(), 0);

        let op = Opcode::encode(6, 0, 0, 0, 0, 0);
        assert!(matches!(op.command(), Err(CartError::InvalidCommand(6))));
    }

    #[test]
    fn test_with_ret() {
        let op = Opcode::build(Command::LoadCartridge, 12, 0);
        let failed = op.with_ret(true);
        assert!(!failed.is_success());
        assert_eq!(failed.cartridge(), 12);
        assert_eq!(failed.command().unwrap(), Command::LoadCartridge);
        assert!(failed.with_ret(false).is_success());
        assert_eq!(failed.with_ret(false), op);
    }

    #[test]
    fn test_network_byte_order() {
        let op = Opcode::build(Command::ReadFrame, 0, 5);
        let bytes = op.to_be_bytes();
        assert_eq!(bytes[0], 3);
        assert_eq!(Opcode::from_be_bytes(bytes), op);
    }

    #[test]
    fn test_register_masks() {
        for register in Register::ALL {
            assert_eq!(Register::from_u8(register as u8).unwrap(), register);
            assert_eq!(register.mask().count_ones(), register.width());
        }
    }
}
