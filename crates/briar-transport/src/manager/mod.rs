//! Key manager: tag recognition and outgoing stream contexts.
//!
//! Owns every [`TransportKeySet`] in memory, keyed by (contact, transport).
//! Each key set sits behind its own mutex so work for different contacts runs
//! in parallel; the map itself is only write-locked when contacts come and
//! go.
//!
//! # Persist Before Use
//!
//! ```text
//! recognise_tag                          get_stream_context
//!   lock key set                           lock key set
//!   rotate if the period moved             rotate if the period moved
//!   find tag in unseen candidates          take counter value
//!   window' = window + stream              storage.set_stream_counter(+1)
//!   storage.set_reordering_window(window')   │
//!     │                                      ▼ on Ok
//!     ▼ on Ok                              commit counter in memory
//!   commit window' in memory               return context
//!   return context
//! ```
//!
//! A failed write returns an error and leaves the in-memory key set exactly as
//! it was, so memory never runs ahead of storage.
//!
//! # Lock Order
//!
//! The key set map is always taken before a key set's mutex, never after.

#![allow(clippy::disallowed_types, reason = "Synchronous key state, never held across await")]

mod error;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use briar_crypto::SecretKey;
use briar_proto::{MAX_CLOCK_DIFFERENCE, PROTOCOL_VERSION, TAG_LENGTH};
pub use error::KeyManagerError;

use crate::{
    endpoint::{ContactId, Endpoint, TransportId},
    env::Environment,
    keys::{StreamContext, TransportKeySet},
    storage::Storage,
};

/// How long the rotation task sleeps when there are no key sets
const IDLE_ROTATION_CHECK: Duration = Duration::from_secs(60);

/// Key manager configuration
#[derive(Debug, Clone)]
pub struct KeyManagerConfig {
    /// Clock skew tolerated between contacts
    ///
    /// Added to each transport's maximum latency to get its rotation period.
    pub max_clock_difference: Duration,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self { max_clock_difference: MAX_CLOCK_DIFFERENCE }
    }
}

/// One key set slot. `None` once the contact or transport is removed, so a
/// caller that grabbed the slot before removal skips it.
type KeySlot = Arc<Mutex<Option<TransportKeySet>>>;

/// Shared key state for all contacts and transports.
///
/// Generic over the environment (wall clock, sleep) and storage backend, both
/// passed in explicitly.
pub struct KeyManager<E: Environment, S: Storage> {
    env: E,
    storage: S,
    config: KeyManagerConfig,
    /// Rotation period in milliseconds, per registered transport
    transports: RwLock<HashMap<TransportId, u64>>,
    key_sets: RwLock<HashMap<(ContactId, TransportId), KeySlot>>,
}

impl<E: Environment, S: Storage> KeyManager<E, S> {
    /// Create a key manager with no transports and no key sets.
    ///
    /// Call [`add_transport`](Self::add_transport) for every transport, then
    /// [`start`](Self::start) to load persisted key sets.
    pub fn new(env: E, storage: S, config: KeyManagerConfig) -> Self {
        Self {
            env,
            storage,
            config,
            transports: RwLock::new(HashMap::new()),
            key_sets: RwLock::new(HashMap::new()),
        }
    }

    /// Storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Register a transport and derive its rotation period.
    ///
    /// The rotation period is `max_latency` plus the configured clock
    /// difference. Registering again replaces the period.
    pub fn add_transport(&self, transport_id: TransportId, max_latency: Duration) {
        let rotation = max_latency.saturating_add(self.config.max_clock_difference);
        let rotation_ms = u64::try_from(rotation.as_millis()).unwrap_or(u64::MAX).max(1);

        tracing::info!("Registered transport {} (rotation every {:?})", transport_id, rotation);
        self.write_transports().insert(transport_id, rotation_ms);
    }

    /// Forget a transport and drop its key sets from memory.
    ///
    /// Persisted key sets are kept; they load again once the transport is
    /// re-registered and [`start`](Self::start) runs.
    pub fn remove_transport(&self, transport_id: &TransportId) {
        self.write_transports().remove(transport_id);

        let removed: Vec<KeySlot> = {
            let mut key_sets = self.write_key_sets();
            let doomed: Vec<_> =
                key_sets.keys().filter(|(_, t)| t == transport_id).cloned().collect();
            doomed.iter().filter_map(|pair| key_sets.remove(pair)).collect()
        };
        for slot in &removed {
            *lock(slot) = None;
        }

        tracing::info!("Removed transport {} ({} key sets)", transport_id, removed.len());
    }

    /// Load persisted key sets and bring them up to the current period.
    ///
    /// Key sets that rotated are written back before they are used. Returns
    /// the number of key sets loaded.
    ///
    /// # Errors
    ///
    /// - `KeyManagerError::UnknownTransport` if a stored key set belongs to a
    ///   transport that was not registered
    /// - `KeyManagerError::Storage` if loading or writing back fails
    pub fn start(&self) -> Result<usize, KeyManagerError> {
        let loaded = self.storage.load_keys()?;
        let now_ms = self.env.wall_clock_ms();

        let mut ready = Vec::with_capacity(loaded.len());
        for mut keys in loaded {
            let rotation_ms = self.rotation_ms(keys.transport_id())?;
            self.rotate_to_now(&mut keys, now_ms, rotation_ms)?;
            ready.push(keys);
        }

        let count = ready.len();
        let mut key_sets = self.write_key_sets();
        for keys in ready {
            let pair = (keys.contact_id(), keys.transport_id().clone());
            key_sets.insert(pair, Arc::new(Mutex::new(Some(keys))));
        }

        tracing::info!("Key manager started with {} key sets", count);
        Ok(count)
    }

    /// Derive and persist keys for a newly added contact.
    ///
    /// With `active = false` no outgoing stream is opened until
    /// [`activate_keys`](Self::activate_keys) runs or the contact's first
    /// incoming stream is recognised.
    ///
    /// # Errors
    ///
    /// - `KeyManagerError::UnknownTransport` if the endpoint's transport is
    ///   not registered
    /// - `KeyManagerError::DuplicateKeySet` if the pair already has keys
    /// - `KeyManagerError::Storage` if the new key set cannot be saved
    pub fn contact_added(
        &self,
        endpoint: Endpoint,
        master_secret: &SecretKey,
        active: bool,
    ) -> Result<(), KeyManagerError> {
        let rotation_ms = self.rotation_ms(&endpoint.transport_id)?;
        let pair = (endpoint.contact_id, endpoint.transport_id.clone());

        let mut key_sets = self.write_key_sets();
        if key_sets.contains_key(&pair) {
            return Err(KeyManagerError::DuplicateKeySet {
                contact_id: pair.0,
                transport_id: pair.1,
            });
        }

        let period = endpoint.period_at(self.env.wall_clock_ms(), rotation_ms);
        let keys = TransportKeySet::derive(endpoint, master_secret, period, active)?;
        self.storage.save_keys(&keys)?;

        tracing::info!(
            "Added keys for {} on {} at period {} (active: {})",
            pair.0,
            pair.1,
            period,
            active
        );
        key_sets.insert(pair, Arc::new(Mutex::new(Some(keys))));
        Ok(())
    }

    /// Delete every key set of a contact, in storage and in memory.
    ///
    /// Waits for work already running on the contact's key sets, so a rotation
    /// in flight cannot write them back after the delete.
    ///
    /// # Errors
    ///
    /// - `KeyManagerError::Storage` if the stored key sets cannot be removed;
    ///   memory is left untouched
    pub fn contact_removed(&self, contact_id: ContactId) -> Result<(), KeyManagerError> {
        let mut key_sets = self.write_key_sets();
        let doomed: Vec<_> = key_sets.keys().filter(|(c, _)| *c == contact_id).cloned().collect();
        let removed: Vec<_> =
            doomed.iter().filter_map(|pair| key_sets.remove_entry(pair)).collect();

        let result = {
            let mut guards: Vec<_> = removed.iter().map(|(_, slot)| lock(slot)).collect();
            let result = self.storage.remove_contact(contact_id);
            if result.is_ok() {
                for guard in &mut guards {
                    **guard = None;
                }
            }
            result
        };

        if let Err(e) = result {
            key_sets.extend(removed);
            return Err(e.into());
        }

        tracing::info!("Removed {} key sets for {}", removed.len(), contact_id);
        Ok(())
    }

    /// Allow outgoing streams with a contact's keys on a transport.
    ///
    /// Returns `Ok(false)` if there are no keys for the pair or they are
    /// already active.
    ///
    /// # Errors
    ///
    /// - `KeyManagerError::Storage` if the activation cannot be persisted;
    ///   the keys stay inactive
    pub fn activate_keys(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
    ) -> Result<bool, KeyManagerError> {
        let Some(slot) = self.slot(contact_id, transport_id) else {
            return Ok(false);
        };

        let mut guard = lock(&slot);
        let Some(keys) = guard.as_mut() else {
            return Ok(false);
        };
        if keys.is_active() {
            return Ok(false);
        }

        let mut activated = keys.clone();
        activated.set_active();
        self.storage.save_keys(&activated)?;

        tracing::info!("Activated keys for {} on {}", contact_id, transport_id);
        *keys = activated;
        Ok(true)
    }

    /// Recognise the tag that opens an incoming stream.
    ///
    /// Tries every contact's previous, current and next incoming keys on the
    /// transport, against each unseen stream number in the slot's window. On
    /// a match the stream number is marked seen and persisted before the
    /// context is returned. Unknown tags and replays both return `Ok(None)`.
    ///
    /// Recognising a stream from a contact whose keys are inactive activates
    /// them, in the same write as the window. A key set whose lazy rotation
    /// cannot be persisted is logged and skipped.
    ///
    /// # Errors
    ///
    /// - `KeyManagerError::UnknownTransport` if the transport is not
    ///   registered
    /// - `KeyManagerError::Storage` if persisting the matched window fails;
    ///   the stream must not be accepted
    pub fn recognise_tag(
        &self,
        transport_id: &TransportId,
        tag: &[u8],
    ) -> Result<Option<StreamContext>, KeyManagerError> {
        let rotation_ms = self.rotation_ms(transport_id)?;
        if tag.len() != TAG_LENGTH {
            return Ok(None);
        }

        let candidates: Vec<KeySlot> = self
            .read_key_sets()
            .iter()
            .filter(|((_, t), _)| t == transport_id)
            .map(|(_, slot)| Arc::clone(slot))
            .collect();

        let now_ms = self.env.wall_clock_ms();
        for slot in candidates {
            let mut guard = lock(&slot);
            let Some(keys) = guard.as_mut() else {
                continue;
            };

            if let Err(e) = self.rotate_to_now(keys, now_ms, rotation_ms) {
                tracing::warn!(
                    "Skipping keys for {} on {}, rotation failed: {}",
                    keys.contact_id(),
                    transport_id,
                    e
                );
                continue;
            }

            let Some((period, stream_number)) = keys.find_tag(PROTOCOL_VERSION, tag) else {
                continue;
            };
            let Some(mut window) = keys.window(period).copied() else {
                continue;
            };
            if !window.set_seen(stream_number) {
                continue;
            }

            if keys.is_active() {
                self.storage.set_reordering_window(
                    keys.contact_id(),
                    keys.transport_id(),
                    period,
                    &window,
                )?;
                keys.set_window(period, window);
            } else {
                let mut updated = keys.clone();
                updated.set_window(period, window);
                updated.set_active();
                self.storage.save_keys(&updated)?;

                tracing::info!("Activated keys for {} on {}", keys.contact_id(), transport_id);
                *keys = updated;
            }

            tracing::debug!(
                "Recognised stream {} from {} on {} (period {})",
                stream_number,
                keys.contact_id(),
                transport_id,
                period
            );
            return Ok(keys.incoming_context(period, stream_number));
        }

        Ok(None)
    }

    /// Context for a new outgoing stream to a contact.
    ///
    /// Uses the current period's outgoing keys and consumes one stream
    /// number; the incremented counter is persisted first. Returns `Ok(None)`
    /// if there are no keys for the pair, the keys are not active yet, or the
    /// period's stream numbers are used up.
    ///
    /// # Errors
    ///
    /// - `KeyManagerError::UnknownTransport` if the transport is not
    ///   registered
    /// - `KeyManagerError::Storage` if persisting the counter or a lazy
    ///   rotation fails; no stream number is consumed
    pub fn get_stream_context(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
    ) -> Result<Option<StreamContext>, KeyManagerError> {
        let rotation_ms = self.rotation_ms(transport_id)?;
        let Some(slot) = self.slot(contact_id, transport_id) else {
            return Ok(None);
        };

        let mut guard = lock(&slot);
        let Some(keys) = guard.as_mut() else {
            return Ok(None);
        };

        self.rotate_to_now(keys, self.env.wall_clock_ms(), rotation_ms)?;

        if !keys.is_active() {
            tracing::debug!("Keys for {} on {} are not active yet", contact_id, transport_id);
            return Ok(None);
        }
        let Some(context) = keys.outgoing_context() else {
            tracing::warn!(
                "Outgoing stream numbers exhausted for {} on {} in period {}",
                contact_id,
                transport_id,
                keys.period()
            );
            return Ok(None);
        };

        let period = keys.period();
        let counter = context.stream_number + 1;
        self.storage.set_stream_counter(contact_id, transport_id, period, counter)?;
        keys.set_outgoing_stream_counter(period, counter);

        tracing::debug!(
            "Opening stream {} to {} on {} (period {})",
            context.stream_number,
            contact_id,
            transport_id,
            period
        );
        Ok(Some(context))
    }

    /// Whether [`get_stream_context`](Self::get_stream_context) would
    /// currently hand out a context. Has no side effects.
    pub fn can_send_outgoing_streams(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
    ) -> bool {
        let Ok(rotation_ms) = self.rotation_ms(transport_id) else {
            return false;
        };
        let Some(slot) = self.slot(contact_id, transport_id) else {
            return false;
        };

        let guard = lock(&slot);
        let Some(keys) = guard.as_ref() else {
            return false;
        };

        // A pending rotation resets the counter
        let period = keys.endpoint().period_at(self.env.wall_clock_ms(), rotation_ms);
        keys.is_active() && (period > keys.period() || keys.outgoing_context().is_some())
    }

    /// Rotate every key set whose period has moved on.
    ///
    /// Returns the number of key sets rotated.
    ///
    /// # Errors
    ///
    /// - `KeyManagerError::Storage` if writing a rotated key set fails; key
    ///   sets handled before the failure stay rotated
    pub fn rotate_keys(&self) -> Result<usize, KeyManagerError> {
        let slots: Vec<(TransportId, KeySlot)> = self
            .read_key_sets()
            .iter()
            .map(|((_, t), slot)| (t.clone(), Arc::clone(slot)))
            .collect();

        let now_ms = self.env.wall_clock_ms();
        let mut rotated = 0;
        for (transport_id, slot) in slots {
            let Ok(rotation_ms) = self.rotation_ms(&transport_id) else {
                continue;
            };
            let mut guard = lock(&slot);
            if let Some(keys) = guard.as_mut()
                && self.rotate_to_now(keys, now_ms, rotation_ms)?
            {
                rotated += 1;
            }
        }

        Ok(rotated)
    }

    /// Time until the earliest key set reaches its next period.
    ///
    /// `None` when there are no key sets.
    pub fn time_until_next_rotation(&self) -> Option<Duration> {
        let now_ms = self.env.wall_clock_ms();
        let transports = self.read_transports();

        self.read_key_sets()
            .values()
            .filter_map(|slot| {
                let guard = lock(slot);
                let keys = guard.as_ref()?;
                let rotation_ms = transports.get(keys.transport_id())?;
                Some(keys.endpoint().ms_until_next_period(now_ms, *rotation_ms))
            })
            .min()
            .map(Duration::from_millis)
    }

    /// Rotation task: sleep until the next period boundary, rotate, repeat.
    ///
    /// Never returns; spawn it and drop the handle to stop it. Failures are
    /// logged and retried at the next wake-up.
    pub async fn run_rotation(&self) {
        loop {
            let delay = self.time_until_next_rotation().unwrap_or(IDLE_ROTATION_CHECK);
            self.env.sleep(delay).await;

            match self.rotate_keys() {
                Ok(0) => {},
                Ok(count) => tracing::info!("Rotated {} key sets", count),
                Err(e) => tracing::warn!("Key rotation failed: {}", e),
            }
        }
    }

    /// Number of key sets held in memory.
    pub fn key_set_count(&self) -> usize {
        self.read_key_sets().len()
    }

    /// Rotate `keys` to the period containing `now_ms`, persisting first.
    ///
    /// Returns `true` if the key set rotated. A clock that went backwards
    /// leaves the key set where it is.
    fn rotate_to_now(
        &self,
        keys: &mut TransportKeySet,
        now_ms: u64,
        rotation_ms: u64,
    ) -> Result<bool, KeyManagerError> {
        let period = keys.endpoint().period_at(now_ms, rotation_ms);
        if period <= keys.period() {
            return Ok(false);
        }

        let mut rotated = keys.clone();
        rotated.rotate(period)?;
        self.storage.save_keys(&rotated)?;

        tracing::info!(
            "Rotated keys for {} on {} from period {} to {}",
            keys.contact_id(),
            keys.transport_id(),
            keys.period(),
            period
        );
        *keys = rotated;
        Ok(true)
    }

    fn rotation_ms(&self, transport_id: &TransportId) -> Result<u64, KeyManagerError> {
        self.read_transports()
            .get(transport_id)
            .copied()
            .ok_or_else(|| KeyManagerError::UnknownTransport { transport_id: transport_id.clone() })
    }

    fn slot(&self, contact_id: ContactId, transport_id: &TransportId) -> Option<KeySlot> {
        self.read_key_sets().get(&(contact_id, transport_id.clone())).map(Arc::clone)
    }

    #[allow(clippy::expect_used)]
    fn read_transports(&self) -> RwLockReadGuard<'_, HashMap<TransportId, u64>> {
        self.transports.read().expect("transport map poisoned")
    }

    #[allow(clippy::expect_used)]
    fn write_transports(&self) -> RwLockWriteGuard<'_, HashMap<TransportId, u64>> {
        self.transports.write().expect("transport map poisoned")
    }

    #[allow(clippy::expect_used)]
    fn read_key_sets(&self) -> RwLockReadGuard<'_, HashMap<(ContactId, TransportId), KeySlot>> {
        self.key_sets.read().expect("key set map poisoned")
    }

    #[allow(clippy::expect_used)]
    fn write_key_sets(&self) -> RwLockWriteGuard<'_, HashMap<(ContactId, TransportId), KeySlot>> {
        self.key_sets.write().expect("key set map poisoned")
    }
}

#[allow(clippy::expect_used)]
fn lock(slot: &Mutex<Option<TransportKeySet>>) -> MutexGuard<'_, Option<TransportKeySet>> {
    slot.lock().expect("key set mutex poisoned")
}
