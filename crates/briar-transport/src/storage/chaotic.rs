//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that randomly fails operations to test that the key manager
//! never hands out a stream whose bookkeeping did not reach storage.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use super::{Storage, StorageError};
use crate::{
    endpoint::{ContactId, TransportId},
    keys::TransportKeySet,
    window::ReorderingWindow,
};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but randomly fails
/// operations based on a configured failure rate. Clones share the RNG, the
/// failure rate and the operation counter.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    chaos: Arc<Mutex<Chaos>>,
}

/// Failure rate, RNG and counter behind one lock
struct Chaos {
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    rng: ChaoticRng,
    operations: usize,
}

/// Simple deterministic RNG for chaos injection
///
/// Linear congruential generator, so chaos tests are reproducible with the
/// same seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

fn check_rate(failure_rate: f64) {
    assert!(
        (0.0..=1.0).contains(&failure_rate),
        "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
    );
}

impl<S: Storage> ChaoticStorage<S> {
    /// Create a new chaotic storage wrapper
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        check_rate(failure_rate);

        Self {
            inner,
            chaos: Arc::new(Mutex::new(Chaos {
                failure_rate,
                rng: ChaoticRng { state: seed },
                operations: 0,
            })),
        }
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Change the failure rate for subsequent operations.
    ///
    /// Lets a test set up state reliably, then turn on failures.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn set_failure_rate(&self, failure_rate: f64) {
        check_rate(failure_rate);
        #[allow(clippy::expect_used)]
        let mut chaos = self.chaos.lock().expect("Chaos mutex poisoned");
        chaos.failure_rate = failure_rate;
    }

    /// Total number of storage operations attempted.
    pub fn operation_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        self.chaos.lock().expect("Chaos mutex poisoned").operations
    }

    /// Count the operation and decide whether it fails.
    fn inject(&self) -> Result<(), StorageError> {
        #[allow(clippy::expect_used)]
        let mut chaos = self.chaos.lock().expect("Chaos mutex poisoned");
        chaos.operations += 1;

        let failure_rate = chaos.failure_rate;
        if chaos.rng.next() < failure_rate {
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn save_keys(&self, keys: &TransportKeySet) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.save_keys(keys)
    }

    fn load_keys(&self) -> Result<Vec<TransportKeySet>, StorageError> {
        self.inject()?;
        self.inner.load_keys()
    }

    fn remove_keys(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
    ) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.remove_keys(contact_id, transport_id)
    }

    fn remove_contact(&self, contact_id: ContactId) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.remove_contact(contact_id)
    }

    fn set_reordering_window(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
        period: u64,
        window: &ReorderingWindow,
    ) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.set_reordering_window(contact_id, transport_id, period, window)
    }

    fn set_stream_counter(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
        period: u64,
        counter: u64,
    ) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.set_stream_counter(contact_id, transport_id, period, counter)
    }
}

#[cfg(test)]
mod tests {
    use briar_crypto::SecretKey;

    use super::*;
    use crate::{endpoint::Endpoint, storage::MemoryStorage};

    fn key_set(contact: u32) -> TransportKeySet {
        let endpoint = Endpoint::new(ContactId(contact), TransportId::new("tcp"), 0, true);
        TransportKeySet::derive(endpoint, &SecretKey::from_bytes([7; 32]), 0, true).unwrap()
    }

    #[test]
    fn test_chaotic_with_zero_failure_rate() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 0.0);

        for i in 0..100 {
            chaotic.save_keys(&key_set(i)).expect("should not fail with 0% rate");
        }

        assert_eq!(chaotic.load_keys().expect("load failed").len(), 100);
        assert_eq!(chaotic.operation_count(), 101);
    }

    #[test]
    fn test_chaotic_with_100_failure_rate() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.0);
        let tcp = TransportId::new("tcp");

        assert!(chaotic.save_keys(&key_set(1)).is_err());
        assert!(chaotic.load_keys().is_err());
        assert!(chaotic.set_stream_counter(ContactId(1), &tcp, 0, 1).is_err());
        assert_eq!(chaotic.inner().key_set_count(), 0);
    }

    #[test]
    fn test_failures_are_transient() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.0);
        let err = chaotic.load_keys().unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_chaotic_deterministic_with_seed() {
        let chaotic1 = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, 42);
        let chaotic2 = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, 42);

        for i in 0..100 {
            let result1 = chaotic1.save_keys(&key_set(i));
            let result2 = chaotic2.save_keys(&key_set(i));

            assert_eq!(result1.is_ok(), result2.is_ok(), "determinism violated at iteration {i}");
        }
    }

    #[test]
    fn test_set_failure_rate_applies_to_clones() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 0.0);
        let clone = chaotic.clone();

        chaotic.save_keys(&key_set(1)).unwrap();
        chaotic.set_failure_rate(1.0);

        assert!(clone.save_keys(&key_set(2)).is_err());
        assert_eq!(chaotic.inner().key_set_count(), 1);
    }

    #[test]
    #[should_panic(expected = "failure_rate must be between 0.0 and 1.0")]
    fn test_chaotic_rejects_invalid_failure_rate() {
        let _chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.5);
    }
}
