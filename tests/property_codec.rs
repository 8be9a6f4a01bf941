//! Property-based tests for the opcode codec and wire framing

use cartdrive::core::transport::wire;
use cartdrive::{Command, Opcode, Register, Response};
use proptest::prelude::*;
use std::io::Cursor;

fn command() -> impl Strategy<Value = Command> {
    (0u8..6).prop_map(|code| Command::from_u8(code).unwrap())
}

proptest! {
    #[test]
    fn prop_in_range_fields_survive_packing(
        ky1 in 0u64..256,
        ky2 in 0u64..256,
        ret in 0u64..2,
        cart in 0u64..65536,
        frame in 0u64..65536,
        resv in 0u64..32768,
    ) {
        let op = Opcode::encode(ky1, ky2, ret, cart, frame, resv);
        prop_assert_eq!(op.decode(Register::Ky1), ky1);
        prop_assert_eq!(op.decode(Register::Ky2), ky2);
        prop_assert_eq!(op.decode(Register::Ret), ret);
        prop_assert_eq!(op.decode(Register::Cartridge), cart);
        prop_assert_eq!(op.decode(Register::Frame), frame);
        prop_assert_eq!(op.decode(Register::Reserved), resv);
    }

    #[test]
    fn prop_decode_then_encode_is_identity(raw in any::<u64>()) {
        let op = Opcode::from_raw(raw);
        let rebuilt = Opcode::encode(
            op.decode(Register::Ky1),
            op.decode(Register::Ky2),
            op.decode(Register::Ret),
            op.decode(Register::Cartridge),
            op.decode(Register::Frame),
            op.decode(Register::Reserved),
        );
        prop_assert_eq!(rebuilt, op);
        prop_assert_eq!(Opcode::from_be_bytes(op.to_be_bytes()), op);
    }

    #[test]
    fn prop_unknown_tags_rejected(raw in any::<u64>(), tag in 6u8..=255) {
        prop_assert!(Opcode::from_raw(raw).decode_tag(tag).is_err());
    }

    #[test]
    fn prop_ret_bit_is_independent(command in command(), cart in any::<u16>(), frame in any::<u16>()) {
        let op = Opcode::build(command, cart, frame);
        let failed = op.with_ret(true);
        prop_assert!(!failed.is_success());
        prop_assert_eq!(failed.command().unwrap(), command);
        prop_assert_eq!(failed.cartridge(), cart);
        prop_assert_eq!(failed.frame(), frame);
    }

    #[test]
    fn prop_response_framing(
        command in command(),
        frame in any::<u16>(),
        payload in prop::option::of(prop::collection::vec(any::<u8>(), 32)),
    ) {
        let response = Response {
            opcode: Opcode::build(command, 0, frame),
            frame: payload,
        };

        let mut buf = Vec::new();
        wire::write_response(&mut buf, &response).unwrap();
        let expected_len = 16 + response.frame.as_ref().map_or(0, Vec::len);
        prop_assert_eq!(buf.len(), expected_len);

        let decoded = wire::read_response(&mut Cursor::new(&buf), Command::ReadFrame, 32).unwrap();
        prop_assert_eq!(decoded, response);

        // Any truncation is a short transfer, never a bogus response
        if buf.len() > 1 {
            let cut = buf.len() / 2;
            prop_assert!(
                wire::read_response(&mut Cursor::new(&buf[..cut]), Command::ReadFrame, 32).is_err()
            );
        }
    }
}
