#![no_main]
use cartdrive::core::transport::wire;
use cartdrive::{Command, Opcode};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

const FRAME: usize = 64;

// Arbitrary bytes from the network must decode or fail cleanly
fuzz_target!(|input: &[u8]| {
    let Some((&code, input)) = input.split_first() else {
        return;
    };
    let Ok(command) = Command::from_u8(code % 6) else {
        return;
    };

    let mut reader = Cursor::new(input);
    if let Ok(response) = wire::read_response(&mut reader, command, FRAME) {
        if let Some(frame) = &response.frame {
            assert!(command.returns_frame());
            assert_eq!(frame.len(), FRAME);
        }
        let _ = response.opcode.command();
        assert_eq!(Opcode::from_be_bytes(response.opcode.to_be_bytes()), response.opcode);
    }

    let mut reader = Cursor::new(input);
    while let Ok(Some(request)) = wire::read_request(&mut reader, FRAME) {
        if let Some(frame) = &request.frame {
            assert_eq!(frame.len(), FRAME);
        }
    }
});
