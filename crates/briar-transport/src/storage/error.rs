//! Storage error types.
//!
//! Defines errors that can occur during storage operations:
//! - `NotFound`: No key set stored for the (contact, transport) pair
//! - `StalePeriod`: Update targets a period the stored key set does not hold
//! - `Serialization`: Failed to encode/decode data
//! - `Io`: Underlying storage system errors

use thiserror::Error;

use crate::endpoint::{ContactId, TransportId};

/// Errors that can occur during storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No key set stored for this pair
    #[error("no key set for {contact_id} on {transport_id}")]
    NotFound {
        /// Contact that was looked up
        contact_id: ContactId,
        /// Transport that was looked up
        transport_id: TransportId,
    },

    /// Stored key set has no slot for the period being updated
    ///
    /// Means memory and storage disagree about rotation, which the key
    /// manager never allows; treat as corruption.
    #[error("stored key set for {contact_id} on {transport_id} has no slot for period {period}")]
    StalePeriod {
        /// Contact of the key set
        contact_id: ContactId,
        /// Transport of the key set
        transport_id: TransportId,
        /// Period that was targeted
        period: u64,
    },

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),
}

impl StorageError {
    /// Returns true if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_io_errors_are_transient() {
        assert!(StorageError::Io("disk full".to_string()).is_transient());
        assert!(!StorageError::Serialization("bad cbor".to_string()).is_transient());
        assert!(
            !StorageError::NotFound {
                contact_id: ContactId(1),
                transport_id: TransportId::new("tcp"),
            }
            .is_transient()
        );
    }

    #[test]
    fn not_found_names_the_pair() {
        let err =
            StorageError::NotFound { contact_id: ContactId(3), transport_id: TransportId::new("tcp") };
        assert_eq!(err.to_string(), "no key set for contact#3 on tcp");
    }
}
