//! Briar Transport Cryptographic Primitives
//!
//! Cryptographic building blocks for the Briar transport layer. Pure functions
//! with deterministic outputs; nothing here touches the clock, the network or
//! an RNG.
//!
//! # Key Lifecycle
//!
//! Two contacts share a 32-byte master secret from pairing. For every
//! transport, a chain of period secrets is derived from it, one per rotation
//! period. Each period secret yields four directional keys.
//!
//! ```text
//! Master Secret
//!        │
//!        ▼
//! HKDF(transport id) → Period 0 Secret
//!        │
//!        ▼
//! HKDF(period) → Period 1 Secret → Period 2 Secret → ...
//!        │
//!        ├──► initiator tag key     ├──► initiator header key
//!        └──► responder tag key     └──► responder header key
//!
//! tag key    + stream number → HMAC → 16-byte Tag
//! header key + stream number → ChaCha20-Poly1305 → Frames
//! ```
//!
//! # Security
//!
//! Forward Secrecy:
//! - Each period secret is a one-way function of the previous one
//! - Holding the newest secret reveals nothing about earlier periods
//! - Key material is zeroized on drop
//!
//! Domain Separation:
//! - Tag and header keys use distinct labels per owner role
//! - The transport id is bound into period 0, so transports are independent
//!
//! Unlinkability:
//! - Tags are HMAC outputs keyed per period and direction; without the tag
//!   key they are indistinguishable from random bytes
//! - Tag comparison is constant time

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cipher;
pub mod derivation;
pub mod error;
pub mod key;
pub mod tag;

pub use cipher::FrameCipher;
pub use derivation::{
    derive_header_key, derive_initial_secret, derive_period_secret, derive_tag_key, rotate_secret,
};
pub use error::CryptoError;
pub use key::SecretKey;
pub use tag::{encode_tag, tag_matches};
