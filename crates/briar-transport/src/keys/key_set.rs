//! Per-(contact, transport) key material and rotation.
//!
//! A [`TransportKeySet`] holds three period slots. Incoming streams are
//! recognised against all three so that a contact whose clock is up to one
//! period ahead or behind still gets through. Outgoing streams always use
//! the current slot.
//!
//! ```text
//!   period p-1          period p            period p+1
//! ┌────────────┐     ┌────────────┐      ┌────────────┐
//! │  previous  │     │  current   │      │    next    │ ◄── next_secret
//! │ in + window│     │ in + window│      │ in + window│     = secret(p+1)
//! │            │     │ out + ctr  │      │            │
//! └────────────┘     └────────────┘      └────────────┘
//! ```
//!
//! Rotating to `p+1` shifts the slots down, keeps the windows of the slots
//! that survive, and derives a fresh `next` from `next_secret`. Larger jumps
//! step the secret chain forward directly. Secrets for periods that have been
//! rotated past are never stored, so they cannot be recovered.
//!
//! Outgoing keys start inactive when the contact may not hold matching keys
//! yet. They become active explicitly or once the contact's first stream is
//! recognised, and stay active across rotations.

use briar_crypto::{
    SecretKey, derive_header_key, derive_initial_secret, derive_tag_key, rotate_secret,
    tag_matches,
};
use briar_proto::MAX_STREAM_NUMBER;
use serde::{Deserialize, Serialize};

use super::{context::StreamContext, error::KeyError};
use crate::{
    endpoint::{ContactId, Endpoint, TransportId},
    window::ReorderingWindow,
};

/// Tag and header key for one direction of one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    /// Key for computing stream tags
    pub tag_key: SecretKey,
    /// Key for encrypting frames
    pub header_key: SecretKey,
}

/// Keys and replay window for one rotation period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodKeys {
    period: u64,
    incoming: KeyPair,
    outgoing: KeyPair,
    window: ReorderingWindow,
}

impl PeriodKeys {
    fn derive(secret: &SecretKey, period: u64, is_initiator: bool) -> Self {
        Self {
            period,
            incoming: KeyPair {
                tag_key: derive_tag_key(secret, true, is_initiator),
                header_key: derive_header_key(secret, true, is_initiator),
            },
            outgoing: KeyPair {
                tag_key: derive_tag_key(secret, false, is_initiator),
                header_key: derive_header_key(secret, false, is_initiator),
            },
            window: ReorderingWindow::new(),
        }
    }

    /// Rotation period these keys belong to.
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Keys the contact sends with.
    pub fn incoming(&self) -> &KeyPair {
        &self.incoming
    }

    /// Keys we send with.
    pub fn outgoing(&self) -> &KeyPair {
        &self.outgoing
    }

    /// Replay window for incoming streams.
    pub fn window(&self) -> &ReorderingWindow {
        &self.window
    }
}

/// Cursor over the one-way period secret chain.
struct SecretChain {
    period: u64,
    secret: SecretKey,
}

impl SecretChain {
    fn advance_to(&mut self, target: u64) -> &SecretKey {
        debug_assert!(target >= self.period, "the chain only moves forward");
        while self.period < target {
            self.period += 1;
            self.secret = rotate_secret(&self.secret, self.period);
        }
        &self.secret
    }
}

/// An endpoint's key material for one (contact, transport) pair.
///
/// # Invariants
///
/// - `previous`, `current` and `next` are for periods `period - 1`, `period`
///   and `period + 1`; `previous` is absent at period 0
/// - `next_secret` is the period secret for `period + 1`
/// - `outgoing_stream_counter` counts streams sent in `period` and resets on
///   rotation
/// - no outgoing context is handed out while `active` is false
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportKeySet {
    endpoint: Endpoint,
    period: u64,
    previous: Option<PeriodKeys>,
    current: PeriodKeys,
    next: PeriodKeys,
    next_secret: SecretKey,
    outgoing_stream_counter: u64,
    active: bool,
}

impl TransportKeySet {
    /// Derive a key set for `period` from the pairing master secret.
    ///
    /// Pass `active = false` if the contact may not have derived its keys
    /// yet; outgoing streams then wait for [`set_active`](Self::set_active).
    ///
    /// # Errors
    ///
    /// - `KeyError::PeriodOverflow` if `period` is `u64::MAX`
    pub fn derive(
        endpoint: Endpoint,
        master: &SecretKey,
        period: u64,
        active: bool,
    ) -> Result<Self, KeyError> {
        if period == u64::MAX {
            return Err(KeyError::PeriodOverflow { period });
        }

        let is_initiator = endpoint.is_initiator;
        let mut chain = SecretChain {
            period: 0,
            secret: derive_initial_secret(master, endpoint.transport_id.as_str()),
        };

        let previous = period
            .checked_sub(1)
            .map(|p| PeriodKeys::derive(chain.advance_to(p), p, is_initiator));
        let current = PeriodKeys::derive(chain.advance_to(period), period, is_initiator);
        let next = PeriodKeys::derive(chain.advance_to(period + 1), period + 1, is_initiator);

        Ok(Self {
            endpoint,
            period,
            previous,
            current,
            next,
            next_secret: chain.secret,
            outgoing_stream_counter: 0,
            active,
        })
    }

    /// Endpoint these keys belong to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Contact these keys belong to.
    pub fn contact_id(&self) -> ContactId {
        self.endpoint.contact_id
    }

    /// Transport these keys belong to.
    pub fn transport_id(&self) -> &TransportId {
        &self.endpoint.transport_id
    }

    /// Current rotation period.
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Keys for the previous period, absent at period 0.
    pub fn previous(&self) -> Option<&PeriodKeys> {
        self.previous.as_ref()
    }

    /// Keys for the current period.
    pub fn current(&self) -> &PeriodKeys {
        &self.current
    }

    /// Keys for the next period.
    pub fn next(&self) -> &PeriodKeys {
        &self.next
    }

    /// Next outgoing stream number in the current period.
    pub fn outgoing_stream_counter(&self) -> u64 {
        self.outgoing_stream_counter
    }

    /// Whether outgoing streams may use these keys.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Allow outgoing streams. Returns `false` if already active.
    pub fn set_active(&mut self) -> bool {
        !std::mem::replace(&mut self.active, true)
    }

    /// Period slots from oldest to newest.
    pub fn slots(&self) -> impl Iterator<Item = &PeriodKeys> {
        self.previous.iter().chain([&self.current, &self.next])
    }

    /// Replay window of the slot for `period`, if that slot is held.
    pub fn window(&self, period: u64) -> Option<&ReorderingWindow> {
        self.slots().find(|slot| slot.period == period).map(PeriodKeys::window)
    }

    /// Rotate forward to `new_period`.
    ///
    /// Returns `true` if anything changed. Windows of slots that survive the
    /// rotation are kept, as is the active flag; the outgoing stream counter
    /// resets.
    ///
    /// # Errors
    ///
    /// - `KeyError::BackwardRotation` if `new_period < self.period()`
    /// - `KeyError::PeriodOverflow` if `new_period` is `u64::MAX`
    pub fn rotate(&mut self, new_period: u64) -> Result<bool, KeyError> {
        if new_period == self.period {
            return Ok(false);
        }
        if new_period < self.period {
            return Err(KeyError::BackwardRotation { current: self.period, requested: new_period });
        }
        if new_period == u64::MAX {
            return Err(KeyError::PeriodOverflow { period: new_period });
        }

        let is_initiator = self.endpoint.is_initiator;
        let mut retained: Vec<PeriodKeys> = self
            .previous
            .take()
            .into_iter()
            .chain([self.current.clone(), self.next.clone()])
            .filter(|slot| slot.period + 1 >= new_period)
            .collect();
        let mut chain = SecretChain { period: self.period + 1, secret: self.next_secret.clone() };

        let mut slot_for = |period: u64| match retained.iter().position(|s| s.period == period) {
            Some(index) => retained.swap_remove(index),
            None => PeriodKeys::derive(chain.advance_to(period), period, is_initiator),
        };

        // new_period >= 1 here, so there is always a previous slot
        let previous = slot_for(new_period - 1);
        let current = slot_for(new_period);
        let next = slot_for(new_period + 1);

        self.previous = Some(previous);
        self.current = current;
        self.next = next;
        self.next_secret = chain.advance_to(new_period + 1).clone();
        self.period = new_period;
        self.outgoing_stream_counter = 0;

        Ok(true)
    }

    /// Find the slot and stream number whose incoming tag equals `tag`.
    ///
    /// Only unseen stream numbers inside each slot's window are tried, so a
    /// replayed tag never matches.
    pub fn find_tag(&self, protocol_version: u16, tag: &[u8]) -> Option<(u64, u64)> {
        self.slots().find_map(|slot| {
            slot.window
                .unseen()
                .find(|&stream_number| {
                    tag_matches(&slot.incoming.tag_key, protocol_version, stream_number, tag)
                })
                .map(|stream_number| (slot.period, stream_number))
        })
    }

    /// Context for an incoming stream recognised in the slot for `period`.
    pub fn incoming_context(&self, period: u64, stream_number: u64) -> Option<StreamContext> {
        let slot = self.slots().find(|slot| slot.period == period)?;
        Some(StreamContext {
            contact_id: self.endpoint.contact_id,
            transport_id: self.endpoint.transport_id.clone(),
            tag_key: slot.incoming.tag_key.clone(),
            header_key: slot.incoming.header_key.clone(),
            stream_number,
        })
    }

    /// Context for the next outgoing stream, without consuming it.
    ///
    /// Returns `None` while the keys are inactive or once the stream numbers
    /// of this period are exhausted.
    pub fn outgoing_context(&self) -> Option<StreamContext> {
        if !self.active || self.outgoing_stream_counter > MAX_STREAM_NUMBER {
            return None;
        }
        Some(StreamContext {
            contact_id: self.endpoint.contact_id,
            transport_id: self.endpoint.transport_id.clone(),
            tag_key: self.current.outgoing.tag_key.clone(),
            header_key: self.current.outgoing.header_key.clone(),
            stream_number: self.outgoing_stream_counter,
        })
    }

    /// Replace the window of the slot for `period`.
    ///
    /// Returns `false` if no slot for `period` is held.
    pub fn set_window(&mut self, period: u64, window: ReorderingWindow) -> bool {
        let slot = [self.previous.as_mut(), Some(&mut self.current), Some(&mut self.next)]
            .into_iter()
            .flatten()
            .find(|slot| slot.period == period);

        match slot {
            Some(slot) => {
                slot.window = window;
                true
            },
            None => false,
        }
    }

    /// Set the outgoing stream counter for `period`.
    ///
    /// Returns `false` if `period` is not the current period.
    pub fn set_outgoing_stream_counter(&mut self, period: u64, counter: u64) -> bool {
        if period != self.period {
            return false;
        }
        self.outgoing_stream_counter = counter;
        true
    }
}

#[cfg(test)]
mod tests {
    use briar_crypto::{derive_period_secret, encode_tag};
    use briar_proto::PROTOCOL_VERSION;

    use super::*;

    const TRANSPORT: &str = "org.briarproject.bramble.tcp";

    fn master() -> SecretKey {
        SecretKey::from_bytes([0x5A; 32])
    }

    fn endpoint(is_initiator: bool) -> Endpoint {
        Endpoint::new(ContactId(1), TransportId::new(TRANSPORT), 0, is_initiator)
    }

    fn key_set(period: u64, is_initiator: bool) -> TransportKeySet {
        TransportKeySet::derive(endpoint(is_initiator), &master(), period, true).unwrap()
    }

    #[test]
    fn slots_cover_adjacent_periods() {
        let keys = key_set(5, true);
        let periods: Vec<u64> = keys.slots().map(PeriodKeys::period).collect();
        assert_eq!(periods, vec![4, 5, 6]);
        assert_eq!(keys.outgoing_stream_counter(), 0);
    }

    #[test]
    fn period_zero_has_no_previous_slot() {
        let keys = key_set(0, true);
        assert!(keys.previous().is_none());
        let periods: Vec<u64> = keys.slots().map(PeriodKeys::period).collect();
        assert_eq!(periods, vec![0, 1]);
    }

    #[test]
    fn next_secret_continues_the_chain() {
        let keys = key_set(3, true);
        assert_eq!(keys.next_secret, derive_period_secret(&master(), TRANSPORT, 4));
    }

    #[test]
    fn current_outgoing_matches_peer_current_incoming() {
        let alice = key_set(7, true);
        let bob = key_set(7, false);

        assert_eq!(alice.current().outgoing(), bob.current().incoming());
        assert_eq!(bob.current().outgoing(), alice.current().incoming());
    }

    #[test]
    fn rotate_by_one_keeps_surviving_windows() {
        let mut keys = key_set(5, true);
        let mut window = *keys.current().window();
        window.set_seen(3);
        assert!(keys.set_window(5, window));

        assert!(keys.rotate(6).unwrap());

        assert_eq!(keys.period(), 6);
        assert_eq!(keys.previous().map(PeriodKeys::period), Some(5));
        assert_eq!(keys.window(5), Some(&window));
        assert_eq!(keys.window(4), None, "period 4 was rotated away");
    }

    #[test]
    fn rotate_to_same_period_is_noop() {
        let mut keys = key_set(5, true);
        let before = keys.clone();
        assert!(!keys.rotate(5).unwrap());
        assert_eq!(keys, before);
    }

    #[test]
    fn rotate_backwards_is_rejected() {
        let mut keys = key_set(5, true);
        assert_eq!(keys.rotate(4), Err(KeyError::BackwardRotation { current: 5, requested: 4 }));
        assert_eq!(keys.period(), 5);
    }

    #[test]
    fn rotate_resets_outgoing_counter() {
        let mut keys = key_set(1, true);
        assert!(keys.set_outgoing_stream_counter(1, 10));
        keys.rotate(2).unwrap();
        assert_eq!(keys.outgoing_stream_counter(), 0);
    }

    #[test]
    fn long_jump_matches_fresh_derivation() {
        let mut keys = key_set(2, true);
        keys.rotate(50).unwrap();
        assert_eq!(keys, key_set(50, true));
    }

    #[test]
    fn rotate_by_one_matches_fresh_derivation() {
        for start in [0, 1, 7] {
            let mut keys = key_set(start, true);
            assert!(keys.rotate(start + 1).unwrap());
            assert_eq!(keys, key_set(start + 1, true), "from period {start}");
        }
    }

    #[test]
    fn stepwise_rotation_matches_single_jump() {
        let mut stepwise = key_set(3, false);
        stepwise.rotate(4).unwrap();
        stepwise.rotate(5).unwrap();

        let mut jump = key_set(3, false);
        jump.rotate(5).unwrap();

        assert_eq!(stepwise, jump);
        assert_eq!(jump, key_set(5, false));
    }

    #[test]
    fn stepwise_rotation_keeps_windows_like_a_jump() {
        let mut seen = ReorderingWindow::new();
        seen.set_seen(2);

        let mut stepwise = key_set(3, true);
        stepwise.set_window(4, seen);
        stepwise.rotate(4).unwrap();
        stepwise.rotate(5).unwrap();

        let mut jump = key_set(3, true);
        jump.set_window(4, seen);
        jump.rotate(5).unwrap();

        assert_eq!(stepwise, jump);
        assert_eq!(jump.window(4), Some(&seen));
    }

    #[test]
    fn inactive_keys_have_no_outgoing_context() {
        let mut keys = TransportKeySet::derive(endpoint(true), &master(), 4, false).unwrap();
        assert!(!keys.is_active());
        assert!(keys.outgoing_context().is_none());

        assert!(keys.set_active());
        assert!(!keys.set_active(), "second activation changes nothing");
        assert_eq!(keys.outgoing_context().map(|c| c.stream_number), Some(0));
    }

    #[test]
    fn rotation_keeps_active_flag() {
        let mut inactive = TransportKeySet::derive(endpoint(true), &master(), 4, false).unwrap();
        inactive.rotate(9).unwrap();
        assert!(!inactive.is_active());

        let mut active = key_set(4, true);
        active.rotate(5).unwrap();
        assert!(active.is_active());
    }

    #[test]
    fn counter_only_set_for_current_period() {
        let mut keys = key_set(3, true);
        assert!(!keys.set_outgoing_stream_counter(2, 1));
        assert!(keys.set_outgoing_stream_counter(3, 1));
        assert_eq!(keys.outgoing_stream_counter(), 1);
    }

    #[test]
    fn outgoing_context_exhausts_at_max_stream_number() {
        let mut keys = key_set(0, true);
        keys.set_outgoing_stream_counter(0, MAX_STREAM_NUMBER);
        assert_eq!(keys.outgoing_context().map(|c| c.stream_number), Some(MAX_STREAM_NUMBER));

        keys.set_outgoing_stream_counter(0, MAX_STREAM_NUMBER + 1);
        assert!(keys.outgoing_context().is_none());
    }

    #[test]
    fn find_tag_locates_slot_and_stream() {
        let alice = key_set(5, true);
        let bob = key_set(5, false);

        // Alice at period 6 sends; Bob still at 5 sees it in his next slot
        let alice_next = key_set(6, true);
        let context = alice_next.outgoing_context().unwrap();
        let tag = context.tag().unwrap();
        assert_eq!(bob.find_tag(PROTOCOL_VERSION, &tag), Some((6, 0)));

        // Tags for our own outgoing direction are not recognised as incoming
        let own = alice.outgoing_context().unwrap().tag().unwrap();
        assert_eq!(alice.find_tag(PROTOCOL_VERSION, &own), None);
    }

    #[test]
    fn find_tag_skips_seen_stream_numbers() {
        let alice = key_set(5, true);
        let mut bob = key_set(5, false);

        let tag = encode_tag(&alice.current().outgoing().tag_key, PROTOCOL_VERSION, 4).unwrap();
        assert_eq!(bob.find_tag(PROTOCOL_VERSION, &tag), Some((5, 4)));

        let mut window = *bob.current().window();
        window.set_seen(4);
        bob.set_window(5, window);
        assert_eq!(bob.find_tag(PROTOCOL_VERSION, &tag), None);
    }

    #[test]
    fn serde_roundtrip() {
        let keys = key_set(9, false);
        let mut bytes = Vec::new();
        ciborium::into_writer(&keys, &mut bytes).unwrap();
        let decoded: TransportKeySet = ciborium::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(decoded, keys);
    }

    mod rotation {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn prop_step_then_step_equals_jump_equals_derive(
                start in 0u64..1000,
                is_initiator in any::<bool>(),
            ) {
                let mut stepwise = key_set(start, is_initiator);
                prop_assert!(stepwise.rotate(start + 1).unwrap());
                prop_assert_eq!(&stepwise, &key_set(start + 1, is_initiator));
                prop_assert!(stepwise.rotate(start + 2).unwrap());

                let mut jump = key_set(start, is_initiator);
                prop_assert!(jump.rotate(start + 2).unwrap());

                prop_assert_eq!(&stepwise, &jump);
                prop_assert_eq!(&jump, &key_set(start + 2, is_initiator));
            }
        }
    }
}
