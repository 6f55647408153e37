//! Frame encryption using `ChaCha20-Poly1305`.
//!
//! The cipher is keyed once per stream with the header key. The caller
//! supplies the nonce and associated data (see `briar_proto::frame_iv` and
//! `briar_proto::frame_aad`) so this module stays free of framing rules.

use briar_proto::{IV_LENGTH, MAC_LENGTH};
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit, Payload},
};

use crate::{error::CryptoError, key::SecretKey};

/// AEAD cipher for the frames of one stream.
pub struct FrameCipher {
    cipher: ChaCha20Poly1305,
}

impl FrameCipher {
    /// Key a cipher with a stream's header key.
    pub fn new(header_key: &SecretKey) -> Self {
        Self { cipher: ChaCha20Poly1305::new(header_key.as_bytes().into()) }
    }

    /// Encrypt and authenticate one frame plaintext.
    ///
    /// Returns `plaintext.len() + MAC_LENGTH` bytes.
    ///
    /// # Security
    ///
    /// - The caller MUST NOT reuse an IV under the same key
    pub fn seal(&self, iv: &[u8; IV_LENGTH], aad: &[u8], plaintext: &[u8]) -> Vec<u8> {
        let payload = Payload { msg: plaintext, aad };
        let Ok(ciphertext) = self.cipher.encrypt(Nonce::from_slice(iv), payload) else {
            unreachable!("ChaCha20-Poly1305 encryption cannot fail for frame-sized inputs");
        };

        debug_assert_eq!(ciphertext.len(), plaintext.len() + MAC_LENGTH);
        ciphertext
    }

    /// Decrypt and authenticate one frame ciphertext.
    ///
    /// # Errors
    ///
    /// - `CryptoError::AuthenticationFailed` if the MAC does not verify
    pub fn open(
        &self,
        iv: &[u8; IV_LENGTH],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < MAC_LENGTH {
            return Err(CryptoError::AuthenticationFailed);
        }

        let payload = Payload { msg: ciphertext, aad };
        self.cipher
            .decrypt(Nonce::from_slice(iv), payload)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}
