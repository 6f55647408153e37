//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. A window
//! or counter update is committed before the call returns, which is what the
//! persist-before-use rule relies on.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};

use super::{Storage, StorageError, apply_counter, apply_window};
use crate::{
    endpoint::{ContactId, TransportId},
    keys::TransportKeySet,
    window::ReorderingWindow,
};

/// Table: key_sets
/// Key: contact_id (4 bytes BE) || transport_id (UTF-8)
/// Value: CBOR-encoded TransportKeySet
const KEY_SETS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("key_sets");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates the key set table if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(KEY_SETS).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Read-modify-write one key set inside a single write transaction.
    fn update(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
        update: impl FnOnce(&mut TransportKeySet) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(KEY_SETS).map_err(|e| StorageError::Io(e.to_string()))?;

            let key = encode_key(contact_id, transport_id);
            let mut keys = {
                let Some(value) =
                    table.get(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?
                else {
                    return Err(StorageError::NotFound {
                        contact_id,
                        transport_id: transport_id.clone(),
                    });
                };
                decode_value(value.value())?
            };

            update(&mut keys)?;

            let bytes = encode_value(&keys)?;
            table
                .insert(key.as_slice(), bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }
}

impl Storage for RedbStorage {
    fn save_keys(&self, keys: &TransportKeySet) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(KEY_SETS).map_err(|e| StorageError::Io(e.to_string()))?;

            let key = encode_key(keys.contact_id(), keys.transport_id());
            let bytes = encode_value(keys)?;
            table
                .insert(key.as_slice(), bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn load_keys(&self) -> Result<Vec<TransportKeySet>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;

        let table = txn.open_table(KEY_SETS).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut key_sets = Vec::new();
        for result in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            let (_, value) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            key_sets.push(decode_value(value.value())?);
        }

        Ok(key_sets)
    }

    fn remove_keys(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
    ) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(KEY_SETS).map_err(|e| StorageError::Io(e.to_string()))?;

            let key = encode_key(contact_id, transport_id);
            table.remove(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn remove_contact(&self, contact_id: ContactId) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(KEY_SETS).map_err(|e| StorageError::Io(e.to_string()))?;

            let prefix = contact_id.0.to_be_bytes();
            let mut doomed = Vec::new();
            for result in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
                let (key, _) = result.map_err(|e| StorageError::Io(e.to_string()))?;
                if key.value().starts_with(&prefix) {
                    doomed.push(key.value().to_vec());
                }
            }

            for key in doomed {
                table.remove(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
            }
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

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

/// Encode the table key: contact_id (4 bytes BE) || transport_id bytes
fn encode_key(contact_id: ContactId, transport_id: &TransportId) -> Vec<u8> {
    let id = transport_id.as_str().as_bytes();
    let mut key = Vec::with_capacity(4 + id.len());
    key.extend_from_slice(&contact_id.0.to_be_bytes());
    key.extend_from_slice(id);
    key
}

fn encode_value(keys: &TransportKeySet) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(keys, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode_value(bytes: &[u8]) -> Result<TransportKeySet, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}
