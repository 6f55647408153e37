//! Briar transport wire format.
//!
//! Constants and codecs shared by both ends of a Briar stream. Everything here
//! is pure: no I/O, no key material. The cryptographic layer
//! (`briar-crypto`) and the stream layer (`briar-transport`) build on these
//! definitions so that both sides agree on the byte layout bit-for-bit.
//!
//! # Stream Layout
//!
//! ```text
//! ┌──────────────┬──────────────────┬──────────────────┬─────┬─────────────────┐
//! │ tag (16 B)   │ frame 0 (32 KiB) │ frame 1 (32 KiB) │ ... │ final frame (≤) │
//! └──────────────┴──────────────────┴──────────────────┴─────┴─────────────────┘
//! ```
//!
//! Each frame is one AEAD ciphertext:
//!
//! ```text
//! ┌─────────────────────── encrypted ───────────────────────┬───────────┐
//! │ header (2 B) │ payload (≤ 32750 B) │ zero padding        │ MAC (16 B)│
//! └──────────────┴─────────────────────┴─────────────────────┴───────────┘
//! ```
//!
//! Non-final frames are always padded to [`MAX_FRAME_LENGTH`] so that an
//! observer learns nothing about packet boundaries. The final frame is sent
//! unpadded and may be shorter.
//!
//! # Nonce and Associated Data
//!
//! - IV (12 bytes): `stream_number (u64 BE) || frame_number (u32 BE)`
//! - AAD (6 bytes): `frame_number (u32 BE) || plaintext_length (u16 BE)`
//!
//! Binding the frame number into both makes frames impossible to reorder,
//! drop or replay within a stream without failing authentication.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
pub mod frame;
pub mod header;
pub mod nonce;

use std::time::Duration;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use nonce::{frame_aad, frame_iv};

/// Length of the pseudo-random stream tag.
pub const TAG_LENGTH: usize = 16;

/// Upper bound on the length of one ciphertext frame, MAC included.
pub const MAX_FRAME_LENGTH: usize = 32_768;

/// Length of the per-frame header inside the ciphertext.
pub const HEADER_LENGTH: usize = 2;

/// Length of the AEAD authentication tag.
pub const MAC_LENGTH: usize = 16;

/// Length of the AEAD nonce.
pub const IV_LENGTH: usize = 12;

/// Length of the associated data bound into each frame.
pub const AAD_LENGTH: usize = 6;

/// Largest plaintext (header + payload + padding) one frame can carry.
pub const MAX_PLAINTEXT_LENGTH: usize = MAX_FRAME_LENGTH - MAC_LENGTH;

/// Largest payload one frame can carry.
pub const MAX_PAYLOAD_LENGTH: usize = MAX_FRAME_LENGTH - HEADER_LENGTH - MAC_LENGTH;

/// Minimum number of bytes every transport must be able to carry per stream.
pub const MIN_STREAM_LENGTH: usize = 1024 * 1024;

/// Clock skew tolerated between two contacts.
pub const MAX_CLOCK_DIFFERENCE: Duration = Duration::from_secs(60 * 60);

/// Number of stream numbers tracked by a reordering window.
pub const REORDERING_WINDOW_SIZE: usize = 32;

/// Transport protocol version bound into every tag.
pub const PROTOCOL_VERSION: u16 = 1;

/// Largest stream number a tag can encode.
pub const MAX_STREAM_NUMBER: u64 = u32::MAX as u64;

/// A pseudo-random stream tag.
pub type Tag = [u8; TAG_LENGTH];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_overhead_is_consistent() {
        assert_eq!(MAX_PAYLOAD_LENGTH, 32_750);
        assert_eq!(MAX_PLAINTEXT_LENGTH, MAX_PAYLOAD_LENGTH + HEADER_LENGTH);
        assert_eq!(IV_LENGTH, 8 + 4);
        assert_eq!(AAD_LENGTH, 4 + 2);
    }

    #[test]
    fn window_fits_bitmap() {
        assert_eq!(REORDERING_WINDOW_SIZE, u32::BITS as usize);
    }
}
