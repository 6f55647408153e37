//! Key manager error types.

use thiserror::Error;

use crate::{
    endpoint::{ContactId, TransportId},
    keys::KeyError,
    storage::StorageError,
};

/// Errors from key manager operations
///
/// Unrecognised or replayed tags are not errors; those come back as `None`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyManagerError {
    /// Transport was never registered with `add_transport`
    ///
    /// Local configuration error, never caused by the remote side.
    #[error("transport {transport_id} is not registered")]
    UnknownTransport {
        /// Transport that was looked up
        transport_id: TransportId,
    },

    /// A key set already exists for this pair
    #[error("{contact_id} already has keys for {transport_id}")]
    DuplicateKeySet {
        /// Contact that was added
        contact_id: ContactId,
        /// Transport the keys were for
        transport_id: TransportId,
    },

    /// Persisting key state failed; the operation had no effect
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Key derivation or rotation failed
    #[error("key error: {0}")]
    Key(#[from] KeyError),
}

impl KeyManagerError {
    /// Returns true if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(err) => err.is_transient(),
            Self::UnknownTransport { .. } | Self::DuplicateKeySet { .. } | Self::Key(_) => false,
        }
    }
}
