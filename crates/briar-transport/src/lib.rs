//! Briar transport security layer.
//!
//! Turns raw transport byte streams into authenticated, encrypted and
//! unlinkable streams between contacts who share a master secret.
//!
//! # Architecture
//!
//! ```text
//!            ┌───────────────────────────────────────┐
//! transport ►│ dispatch: read/write 16-byte tag      │
//!            │     │                                 │
//!            │     ▼                                 │
//!            │ KeyManager ── TransportKeySet per     │
//!            │     │         (contact, transport)    │
//!            │     │             │                   │
//!            │     │             ▼                   │
//!            │     │         Storage (persist first) │
//!            │     ▼                                 │
//!            │ StreamReader / StreamWriter (frames)  │
//!            └───────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TransportKeySet`]: previous/current/next period keys and rotation
//! - [`ReorderingWindow`]: replay protection over stream numbers
//! - [`KeyManager`]: tag recognition, outgoing contexts, rotation
//! - [`StreamWriter`] / [`StreamReader`]: encrypted fixed-length frames
//! - [`dispatch`]: glue between transport connections and the above
//! - [`Storage`]: persistence, with in-memory, redb and fault-injecting
//!   backends
//! - [`Environment`]: wall clock and sleep, injected for deterministic tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatch;
mod endpoint;
pub mod env;
pub mod keys;
mod manager;
pub mod storage;
pub mod stream;
mod window;

pub use dispatch::{
    DispatchError, DuplexStreams, IncomingStream, TransportConnection, TransportConnectionReader,
    TransportConnectionWriter, accept_duplex, accept_incoming, open_duplex, open_outgoing,
};
pub use endpoint::{ContactId, Endpoint, TransportId};
pub use env::Environment;
pub use keys::{KeyError, KeyPair, PeriodKeys, StreamContext, TransportKeySet};
pub use manager::{KeyManager, KeyManagerConfig, KeyManagerError};
pub use storage::{ChaoticStorage, MemoryStorage, RedbStorage, Storage, StorageError};
pub use stream::{StreamError, StreamReader, StreamState, StreamWriter};
pub use window::ReorderingWindow;
