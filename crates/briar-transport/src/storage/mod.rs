//! Persistence for transport key sets
//!
//! Trait-based abstraction for the minimal key state this layer needs to keep
//! across restarts. The trait is synchronous (no async) like the rest of key
//! management; every method must be durable when it returns `Ok`.
//!
//! # Persist Before Use
//!
//! The key manager writes a window update before accepting a stream and a
//! counter increment before handing out an outgoing context. A crash can
//! therefore lose a stream, but never replay or reuse one.

mod chaotic;
mod error;
mod memory;
mod redb;

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;

pub use self::redb::RedbStorage;
use crate::{
    endpoint::{ContactId, TransportId},
    keys::TransportKeySet,
    window::ReorderingWindow,
};

/// Storage abstraction for transport key sets
///
/// Must be Clone (shared by the key manager and its rotation task), Send +
/// Sync (thread-safe), and synchronous. Implementations typically share
/// internal state via Arc, so clones access the same underlying storage.
///
/// # Panics
///
/// Implementations may panic if internal synchronization primitives are
/// poisoned. Acceptable for test/simulation code, but production
/// implementations should handle poisoned mutexes gracefully.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Store a key set, replacing any existing one for the same pair.
    fn save_keys(&self, keys: &TransportKeySet) -> Result<(), StorageError>;

    /// Load every stored key set. Order is not guaranteed.
    fn load_keys(&self) -> Result<Vec<TransportKeySet>, StorageError>;

    /// Remove the key set for one pair.
    ///
    /// Idempotent: removing a missing key set is not an error.
    fn remove_keys(&self, contact_id: ContactId, transport_id: &TransportId)
    -> Result<(), StorageError>;

    /// Remove every key set for a contact, across all transports.
    fn remove_contact(&self, contact_id: ContactId) -> Result<(), StorageError>;

    /// Update the replay window of one period slot.
    ///
    /// # Errors
    ///
    /// - `StorageError::NotFound` if no key set is stored for the pair
    /// - `StorageError::StalePeriod` if the stored set has no slot for
    ///   `period`
    fn set_reordering_window(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
        period: u64,
        window: &ReorderingWindow,
    ) -> Result<(), StorageError>;

    /// Update the outgoing stream counter of the current period.
    ///
    /// # Errors
    ///
    /// - `StorageError::NotFound` if no key set is stored for the pair
    /// - `StorageError::StalePeriod` if `period` is not the stored current
    ///   period
    fn set_stream_counter(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
        period: u64,
        counter: u64,
    ) -> Result<(), StorageError>;
}

/// Apply a window update to a stored key set, shared by the backends.
fn apply_window(
    keys: &mut TransportKeySet,
    period: u64,
    window: &ReorderingWindow,
) -> Result<(), StorageError> {
    if keys.set_window(period, *window) {
        Ok(())
    } else {
        Err(StorageError::StalePeriod {
            contact_id: keys.contact_id(),
            transport_id: keys.transport_id().clone(),
            period,
        })
    }
}

/// Apply a counter update to a stored key set, shared by the backends.
fn apply_counter(keys: &mut TransportKeySet, period: u64, counter: u64) -> Result<(), StorageError> {
    if keys.set_outgoing_stream_counter(period, counter) {
        Ok(())
    } else {
        Err(StorageError::StalePeriod {
            contact_id: keys.contact_id(),
            transport_id: keys.transport_id().clone(),
            period,
        })
    }
}
