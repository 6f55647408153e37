//! Fuzz target for Frame::decode
//!
//! Decodes arbitrary bytes as a frame plaintext, the way the stream reader
//! does after a frame authenticates.
//!
//! # Invariants
//!
//! - NEVER panic, only return Err for invalid data
//! - A decoded non-final frame re-encodes to exactly the input bytes
//!   (padding is all zero and the length is fixed)

#![no_main]

use briar_proto::{Frame, FrameHeader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = FrameHeader::from_bytes(data);

    if let Ok(frame) = Frame::decode(data) {
        if !frame.is_final() {
            assert_eq!(frame.to_plaintext(), data, "decode accepted a non-canonical plaintext");
        }
    }
});
