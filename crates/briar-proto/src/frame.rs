//! Frame plaintext codec.
//!
//! A `Frame` is the plaintext that goes into one AEAD operation: header,
//! payload and, for non-final frames, zero padding up to
//! [`MAX_PLAINTEXT_LENGTH`]. Encryption and decryption live in
//! `briar-crypto`; this module only deals with layout and validation.

use bytes::{BufMut, Bytes};

use crate::{
    FrameHeader, HEADER_LENGTH, MAX_PLAINTEXT_LENGTH,
    errors::{ProtocolError, Result},
};

/// One frame of a stream, before encryption or after decryption.
///
/// # Invariants
///
/// - `payload.len() == header.payload_length()`. Enforced by [`Frame::new`]
///   and [`Frame::decode`].
///
/// # Security
///
/// Padding is verified to be all zeroes on decode. The ciphertext has already
/// authenticated by then, so non-zero padding means the sender is not a
/// conforming implementation and the stream must be dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header
    pub header: FrameHeader,

    /// Payload bytes (padding stripped)
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame around `payload`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if the payload exceeds one frame
    pub fn new(payload: impl Into<Bytes>, is_final: bool) -> Result<Self> {
        let payload = payload.into();
        let header = FrameHeader::new(payload.len(), is_final)?;
        Ok(Self { header, payload })
    }

    /// Whether this is the last frame of the stream.
    pub fn is_final(&self) -> bool {
        self.header.is_final()
    }

    /// Length of the encoded plaintext.
    ///
    /// Non-final frames are always [`MAX_PLAINTEXT_LENGTH`] long. Final frames
    /// carry no padding.
    pub fn plaintext_len(&self) -> usize {
        if self.is_final() { HEADER_LENGTH + self.payload.len() } else { MAX_PLAINTEXT_LENGTH }
    }

    /// Encode the plaintext into `dst`.
    ///
    /// Writes: `[header (2 bytes)] + [payload] + [zero padding]`
    pub fn encode(&self, dst: &mut impl BufMut) {
        debug_assert_eq!(self.payload.len(), self.header.payload_length());

        self.header.encode(dst);
        dst.put_slice(&self.payload);
        dst.put_bytes(0, self.plaintext_len() - HEADER_LENGTH - self.payload.len());
    }

    /// Encode into a freshly allocated buffer.
    pub fn to_plaintext(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.plaintext_len());
        self.encode(&mut buf);
        buf
    }

    /// Decode a decrypted frame plaintext.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if the header is missing
    /// - `ProtocolError::PayloadTooLarge` if the header length is out of range
    /// - `ProtocolError::PayloadOverrun` if the header claims more bytes than
    ///   are present
    /// - `ProtocolError::ShortFrame` if a non-final frame is not full length
    /// - `ProtocolError::InvalidPadding` if any padding byte is non-zero
    pub fn decode(plaintext: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(plaintext)?;

        if !header.is_final() && plaintext.len() != MAX_PLAINTEXT_LENGTH {
            return Err(ProtocolError::ShortFrame {
                expected: MAX_PLAINTEXT_LENGTH,
                actual: plaintext.len(),
            });
        }

        let body = &plaintext[HEADER_LENGTH..];
        let payload_length = header.payload_length();
        if payload_length > body.len() {
            return Err(ProtocolError::PayloadOverrun {
                claimed: payload_length,
                available: body.len(),
            });
        }

        let (payload, padding) = body.split_at(payload_length);
        if let Some(index) = padding.iter().position(|&b| b != 0) {
            return Err(ProtocolError::InvalidPadding {
                offset: HEADER_LENGTH + payload_length + index,
            });
        }

        Ok(Self { header, payload: Bytes::copy_from_slice(payload) })
    }
}
