#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use super::{Storage, StorageError, apply_counter, apply_window};
use crate::{
    endpoint::{ContactId, TransportId},
    keys::TransportKeySet,
    window::ReorderingWindow,
};

/// In-memory storage implementation for testing and simulation
///
/// All state is wrapped in Arc<Mutex<>> to allow Clone and concurrent access.
/// Thread-safe through Mutex, but uses `lock().expect()` which will panic if
/// the mutex is poisoned - acceptable for test code.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

struct MemoryStorageInner {
    /// Key sets by (contact, transport)
    key_sets: HashMap<(ContactId, TransportId), TransportKeySet>,

    /// Number of successful writes, for persist-before-use assertions
    writes: usize,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStorageInner {
                key_sets: HashMap::new(),
                writes: 0,
            })),
        }
    }

    /// Number of stored key sets.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (a thread panicked while
    /// holding the lock). This is acceptable for test/simulation code.
    #[allow(clippy::expect_used)]
    pub fn key_set_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").key_sets.len()
    }

    /// Number of successful write operations so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn write_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").writes
    }

    /// Stored key set for a pair, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn get(&self, contact_id: ContactId, transport_id: &TransportId) -> Option<TransportKeySet> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        inner.key_sets.get(&(contact_id, transport_id.clone())).cloned()
    }

    /// Apply `update` to a stored key set.
    #[allow(clippy::expect_used)]
    fn update(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
        update: impl FnOnce(&mut TransportKeySet) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let Some(keys) = inner.key_sets.get_mut(&(contact_id, transport_id.clone())) else {
            return Err(StorageError::NotFound { contact_id, transport_id: transport_id.clone() });
        };

        // Apply to a copy so a failed update leaves the stored set untouched
        let mut updated = keys.clone();
        update(&mut updated)?;
        *keys = updated;
        inner.writes += 1;

        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for test
    /// code.
    #[allow(clippy::expect_used)]
    fn save_keys(&self, keys: &TransportKeySet) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.key_sets.insert((keys.contact_id(), keys.transport_id().clone()), keys.clone());
        inner.writes += 1;
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn load_keys(&self) -> Result<Vec<TransportKeySet>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.key_sets.values().cloned().collect())
    }

    #[allow(clippy::expect_used)]
    fn remove_keys(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.key_sets.remove(&(contact_id, transport_id.clone()));
        inner.writes += 1;
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn remove_contact(&self, contact_id: ContactId) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.key_sets.retain(|(contact, _), _| *contact != contact_id);
        inner.writes += 1;
        Ok(())
    }

    fn set_reordering_window(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
        period: u64,
        window: &ReorderingWindow,
    ) -> Result<(), StorageError> {
        self.update(contact_id, transport_id, |keys| apply_window(keys, period, window))
    }

    fn set_stream_counter(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
        period: u64,
        counter: u64,
    ) -> Result<(), StorageError> {
        self.update(contact_id, transport_id, |keys| apply_counter(keys, period, counter))
    }
}
