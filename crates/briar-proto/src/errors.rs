//! Protocol error types.
//!
//! Errors raised while encoding or decoding the plaintext side of a frame.
//! Authentication failures belong to the crypto layer; by the time these are
//! produced the ciphertext has already verified, so every variant here points
//! at a broken or malicious peer.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur while handling frame plaintexts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is shorter than the structure being decoded
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum number of bytes required
        expected: usize,
        /// Number of bytes available
        actual: usize,
    },

    /// Payload does not fit in one frame
    #[error("payload too large: {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge {
        /// Payload size that was requested or claimed
        size: usize,
        /// Maximum payload size per frame
        max: usize,
    },

    /// Header claims more payload than the plaintext holds
    #[error("payload length {claimed} exceeds available {available} bytes")]
    PayloadOverrun {
        /// Payload length claimed by the header
        claimed: usize,
        /// Bytes actually following the header
        available: usize,
    },

    /// Non-final frame with a plaintext shorter than the fixed frame size
    #[error("non-final frame has plaintext length {actual}, expected {expected}")]
    ShortFrame {
        /// Required plaintext length for non-final frames
        expected: usize,
        /// Plaintext length received
        actual: usize,
    },

    /// Padding after the payload contains non-zero bytes
    #[error("non-zero padding at offset {offset}")]
    InvalidPadding {
        /// Offset of the first non-zero padding byte within the plaintext
        offset: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_lengths() {
        let err = ProtocolError::PayloadTooLarge { size: 40_000, max: 32_750 };
        assert_eq!(err.to_string(), "payload too large: 40000 bytes exceeds maximum of 32750");

        let err = ProtocolError::InvalidPadding { offset: 7 };
        assert_eq!(err.to_string(), "non-zero padding at offset 7");
    }
}
