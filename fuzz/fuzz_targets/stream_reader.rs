//! Fuzz target for StreamReader
//!
//! Feeds attacker-controlled bytes to a reader, either raw or as validly
//! sealed frames whose plaintext the fuzzer chooses.
//!
//! # Strategy
//!
//! - Raw bytes: arbitrary ciphertext after the tag (MAC failures)
//! - Sealed plaintexts: frames that authenticate but carry bad headers,
//!   short non-final frames, or non-zero padding
//!
//! # Invariants
//!
//! - NEVER panic
//! - Raw bytes never produce payload (forging a MAC is infeasible)
//! - After an error the reader stays closed

#![no_main]

use arbitrary::Arbitrary;
use briar_crypto::{FrameCipher, SecretKey};
use briar_proto::{frame_aad, frame_iv};
use briar_transport::{ContactId, StreamContext, StreamReader, StreamState, TransportId};
use libfuzzer_sys::fuzz_target;

const STREAM_NUMBER: u64 = 9;

#[derive(Debug, Arbitrary)]
enum Input {
    Raw(Vec<u8>),
    Sealed(Vec<Vec<u8>>),
}

fn context() -> StreamContext {
    StreamContext {
        contact_id: ContactId(1),
        transport_id: TransportId::new("fuzz"),
        tag_key: SecretKey::from_bytes([1; 32]),
        header_key: SecretKey::from_bytes([2; 32]),
        stream_number: STREAM_NUMBER,
    }
}

fuzz_target!(|input: Input| {
    let context = context();

    let (wire, sealed) = match input {
        Input::Raw(bytes) => (bytes, false),
        Input::Sealed(plaintexts) => {
            let cipher = FrameCipher::new(&context.header_key);
            let mut wire = Vec::new();
            for (frame_number, plaintext) in (0u32..).zip(plaintexts.iter().take(8)) {
                let iv = frame_iv(STREAM_NUMBER, frame_number);
                let aad = frame_aad(frame_number, plaintext.len());
                wire.extend_from_slice(&cipher.seal(&iv, &aad, plaintext));
            }
            (wire, true)
        }
    };

    let Ok(runtime) = tokio::runtime::Builder::new_current_thread().build() else {
        return;
    };

    runtime.block_on(async {
        let mut reader = StreamReader::after_tag(wire.as_slice(), &context);
        loop {
            match reader.read_frame().await {
                Ok(Some(_)) => assert!(sealed, "forged frame accepted"),
                Ok(None) => break,
                Err(_) => {
                    assert_eq!(reader.state(), StreamState::Closed);
                    break;
                }
            }
        }
    });
});
