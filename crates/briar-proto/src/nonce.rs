//! Per-frame nonce and associated data.
//!
//! Nonces are never random: they are derived from the stream number and the
//! frame number so that a (key, nonce) pair is never reused. Stream numbers
//! are unique per header key, and frame numbers are unique within a stream.

use crate::{AAD_LENGTH, IV_LENGTH};

/// Build the 12-byte AEAD nonce for a frame.
///
/// Structure:
/// - bytes 0-7: `stream_number` (big-endian)
/// - bytes 8-11: `frame_number` (big-endian)
pub fn frame_iv(stream_number: u64, frame_number: u32) -> [u8; IV_LENGTH] {
    let mut iv = [0u8; IV_LENGTH];
    iv[0..8].copy_from_slice(&stream_number.to_be_bytes());
    iv[8..12].copy_from_slice(&frame_number.to_be_bytes());
    iv
}

/// Build the 6-byte associated data for a frame.
///
/// Structure:
/// - bytes 0-3: `frame_number` (big-endian)
/// - bytes 4-5: plaintext length (big-endian)
///
/// `plaintext_length` is at most [`crate::MAX_PLAINTEXT_LENGTH`], which fits in
/// 16 bits.
pub fn frame_aad(frame_number: u32, plaintext_length: usize) -> [u8; AAD_LENGTH] {
    debug_assert!(plaintext_length <= crate::MAX_PLAINTEXT_LENGTH);

    let mut aad = [0u8; AAD_LENGTH];
    aad[0..4].copy_from_slice(&frame_number.to_be_bytes());
    aad[4..6].copy_from_slice(&(plaintext_length as u16).to_be_bytes());
    aad
}
