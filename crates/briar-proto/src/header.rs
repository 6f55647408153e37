//! Frame header.
//!
//! The header is the first two bytes of every frame plaintext and travels
//! inside the ciphertext, so it is never visible on the wire.
//!
//! ```text
//!  15  14                                   0
//! ┌───┬──────────────────────────────────────┐
//! │ F │ payload length (15 bits)             │
//! └───┴──────────────────────────────────────┘
//! ```
//!
//! `F` is set on the final frame of a stream.

use bytes::BufMut;

use crate::{
    HEADER_LENGTH, MAX_PAYLOAD_LENGTH,
    errors::{ProtocolError, Result},
};

/// Decoded two-byte frame header.
///
/// # Invariants
///
/// - `payload_length <= MAX_PAYLOAD_LENGTH`. Enforced by [`FrameHeader::new`]
///   and [`FrameHeader::from_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    payload_length: u16,
    is_final: bool,
}

impl FrameHeader {
    /// Size of the serialized header (2 bytes)
    pub const SIZE: usize = HEADER_LENGTH;

    /// Bit marking the final frame of a stream
    pub const FINAL_FLAG: u16 = 0x8000;

    /// Create a header for a payload of the given length.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if `payload_length` exceeds
    ///   [`MAX_PAYLOAD_LENGTH`]
    pub fn new(payload_length: usize, is_final: bool) -> Result<Self> {
        if payload_length > MAX_PAYLOAD_LENGTH {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_length,
                max: MAX_PAYLOAD_LENGTH,
            });
        }

        Ok(Self { payload_length: payload_length as u16, is_final })
    }

    /// Number of payload bytes following the header.
    pub fn payload_length(&self) -> usize {
        usize::from(self.payload_length)
    }

    /// Whether this is the last frame of the stream.
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Serialize to the two-byte wire form.
    pub fn to_bytes(&self) -> [u8; HEADER_LENGTH] {
        let mut value = self.payload_length;
        if self.is_final {
            value |= Self::FINAL_FLAG;
        }
        value.to_be_bytes()
    }

    /// Write the header into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.to_bytes());
    }

    /// Parse a header from the start of `bytes`.
    ///
    /// Trailing bytes are ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if fewer than two bytes are available
    /// - `ProtocolError::PayloadTooLarge` if the length field exceeds
    ///   [`MAX_PAYLOAD_LENGTH`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(&[hi, lo]) = bytes.first_chunk::<HEADER_LENGTH>() else {
            return Err(ProtocolError::FrameTooShort {
                expected: HEADER_LENGTH,
                actual: bytes.len(),
            });
        };

        let value = u16::from_be_bytes([hi, lo]);
        let is_final = value & Self::FINAL_FLAG != 0;
        let payload_length = usize::from(value & !Self::FINAL_FLAG);

        Self::new(payload_length, is_final)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_flag_is_top_bit() {
        let header = FrameHeader::new(0, true).unwrap();
        assert_eq!(header.to_bytes(), [0x80, 0x00]);

        let header = FrameHeader::new(0x1234, false).unwrap();
        assert_eq!(header.to_bytes(), [0x12, 0x34]);
    }

    #[test]
    fn roundtrip_preserves_fields() {
        let header = FrameHeader::new(MAX_PAYLOAD_LENGTH, true).unwrap();
        let decoded = FrameHeader::from_bytes(&header.to_bytes()).unwrap();

        assert_eq!(decoded, header);
        assert_eq!(decoded.payload_length(), MAX_PAYLOAD_LENGTH);
        assert!(decoded.is_final());
    }

    #[test]
    fn rejects_oversized_payload() {
        let result = FrameHeader::new(MAX_PAYLOAD_LENGTH + 1, false);
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge { .. })));

        // 0x7FFF fits the 15-bit field but exceeds the frame budget
        let result = FrameHeader::from_bytes(&[0x7F, 0xFF]);
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge { size: 0x7FFF, .. })));
    }

    #[test]
    fn rejects_short_buffer() {
        assert_eq!(
            FrameHeader::from_bytes(&[0x80]),
            Err(ProtocolError::FrameTooShort { expected: 2, actual: 1 })
        );
        assert_eq!(
            FrameHeader::from_bytes(&[]),
            Err(ProtocolError::FrameTooShort { expected: 2, actual: 0 })
        );
    }

    #[test]
    fn encode_appends_to_buffer() {
        let header = FrameHeader::new(5, false).unwrap();
        let mut buf = vec![0xAA];
        header.encode(&mut buf);
        assert_eq!(buf, vec![0xAA, 0x00, 0x05]);
    }
}
