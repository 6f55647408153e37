//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors from the Briar crypto primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD authentication tag did not verify
    ///
    /// The ciphertext, associated data or key is wrong. Carries no further
    /// detail on purpose: callers must not be able to tell which.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Key material had the wrong length
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required key length
        expected: usize,
        /// Provided key length
        actual: usize,
    },

    /// Stream number does not fit in a tag
    #[error("stream number {stream_number} exceeds maximum {max}")]
    StreamNumberOutOfRange {
        /// Stream number that was requested
        stream_number: u64,
        /// Largest encodable stream number
        max: u64,
    },
}
