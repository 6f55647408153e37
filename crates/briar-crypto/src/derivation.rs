//! Key derivation for transport keys using HKDF-SHA256.
//!
//! # Period Chain
//!
//! ```text
//! secret(0)     = HKDF(master,      "briar/period/v1" || transport_id)
//! secret(p + 1) = HKDF(secret(p),   "briar/rotate/v1" || u64be(p + 1))
//! ```
//!
//! The chain is one-way: `secret(p)` reveals every later period but none of
//! the earlier ones. Key sets only ever hold the newest secret they need.
//!
//! # Directional Keys
//!
//! Each period secret expands into four keys, labelled by which side of the
//! relationship *owns* them (sends with them). An endpoint's outgoing keys are
//! the ones it owns; its incoming keys are the ones its contact owns. Both
//! sides therefore derive the same bytes for opposite directions without any
//! extra coordination.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::key::SecretKey;

/// Label binding the transport into the first period secret
const PERIOD_ZERO_LABEL: &[u8] = b"briar/period/v1";

/// Label for stepping the period chain forward
const ROTATE_LABEL: &[u8] = b"briar/rotate/v1";

const INITIATOR_TAG_LABEL: &[u8] = b"briar/initiator/tag/v1";
const RESPONDER_TAG_LABEL: &[u8] = b"briar/responder/tag/v1";
const INITIATOR_HEADER_LABEL: &[u8] = b"briar/initiator/header/v1";
const RESPONDER_HEADER_LABEL: &[u8] = b"briar/responder/header/v1";

/// Derive the period 0 secret for a transport from the pairing master secret.
///
/// # Security
///
/// - Different transports produce independent chains
/// - Deterministic: both contacts compute the same secret
pub fn derive_initial_secret(master: &SecretKey, transport_id: &str) -> SecretKey {
    expand(master, PERIOD_ZERO_LABEL, transport_id.as_bytes())
}

/// Step the period chain: derive the secret for `period` from the secret of
/// `period - 1`.
pub fn rotate_secret(previous: &SecretKey, period: u64) -> SecretKey {
    expand(previous, ROTATE_LABEL, &period.to_be_bytes())
}

/// Derive the secret for an arbitrary `period` from the master secret.
///
/// Walks the chain from period 0, so the cost is linear in `period`.
pub fn derive_period_secret(master: &SecretKey, transport_id: &str, period: u64) -> SecretKey {
    let mut secret = derive_initial_secret(master, transport_id);
    for p in 1..=period {
        secret = rotate_secret(&secret, p);
    }
    secret
}

/// Derive the tag key for one direction of a period.
///
/// `is_incoming` selects the direction from the caller's point of view;
/// `is_initiator` is the caller's role.
pub fn derive_tag_key(period_secret: &SecretKey, is_incoming: bool, is_initiator: bool) -> SecretKey {
    let label = if owned_by_initiator(is_incoming, is_initiator) {
        INITIATOR_TAG_LABEL
    } else {
        RESPONDER_TAG_LABEL
    };
    expand(period_secret, label, &[])
}

/// Derive the header (frame encryption) key for one direction of a period.
pub fn derive_header_key(
    period_secret: &SecretKey,
    is_incoming: bool,
    is_initiator: bool,
) -> SecretKey {
    let label = if owned_by_initiator(is_incoming, is_initiator) {
        INITIATOR_HEADER_LABEL
    } else {
        RESPONDER_HEADER_LABEL
    };
    expand(period_secret, label, &[])
}

/// Our outgoing keys are ours; our incoming keys belong to the other side.
fn owned_by_initiator(is_incoming: bool, is_initiator: bool) -> bool {
    is_initiator != is_incoming
}

fn expand(ikm: &SecretKey, label: &[u8], context: &[u8]) -> SecretKey {
    let hkdf = Hkdf::<Sha256>::new(None, ikm.as_bytes());

    // Build the info parameter: label || context
    let mut info = Vec::with_capacity(label.len() + context.len());
    info.extend_from_slice(label);
    info.extend_from_slice(context);

    let mut okm = [0u8; SecretKey::LENGTH];
    let Ok(()) = hkdf.expand(&info, &mut okm) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    let key = SecretKey::from_bytes(okm);
    okm.zeroize();
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSPORT: &str = "org.briarproject.bramble.tcp";

    fn master() -> SecretKey {
        SecretKey::from_bytes(*b"test_master_secret_material_here")
    }

    #[test]
    fn derive_is_deterministic() {
        let a = derive_period_secret(&master(), TRANSPORT, 5);
        let b = derive_period_secret(&master(), TRANSPORT, 5);
        assert_eq!(a, b, "same inputs must produce same output");
    }

    #[test]
    fn different_periods_produce_different_secrets() {
        let p0 = derive_period_secret(&master(), TRANSPORT, 0);
        let p1 = derive_period_secret(&master(), TRANSPORT, 1);
        assert_ne!(p0, p1, "different periods must produce different secrets");
    }

    #[test]
    fn different_transports_produce_different_secrets() {
        let tcp = derive_initial_secret(&master(), TRANSPORT);
        let bt = derive_initial_secret(&master(), "org.briarproject.bramble.bluetooth");
        assert_ne!(tcp, bt, "different transports must produce different secrets");
    }

    #[test]
    fn chain_matches_direct_derivation() {
        let mut secret = derive_initial_secret(&master(), TRANSPORT);
        for p in 1..=10 {
            secret = rotate_secret(&secret, p);
            assert_eq!(secret, derive_period_secret(&master(), TRANSPORT, p));
        }
    }

    #[test]
    fn period_zero_is_initial_secret() {
        assert_eq!(
            derive_period_secret(&master(), TRANSPORT, 0),
            derive_initial_secret(&master(), TRANSPORT)
        );
    }

    #[test]
    fn outgoing_matches_peer_incoming() {
        let secret = derive_period_secret(&master(), TRANSPORT, 3);

        for is_initiator in [true, false] {
            assert_eq!(
                derive_tag_key(&secret, false, is_initiator),
                derive_tag_key(&secret, true, !is_initiator)
            );
            assert_eq!(
                derive_header_key(&secret, false, is_initiator),
                derive_header_key(&secret, true, !is_initiator)
            );
        }
    }

    #[test]
    fn tag_and_header_keys_are_separated() {
        let secret = derive_period_secret(&master(), TRANSPORT, 0);

        let keys = [
            derive_tag_key(&secret, false, true),
            derive_tag_key(&secret, true, true),
            derive_header_key(&secret, false, true),
            derive_header_key(&secret, true, true),
        ];

        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                assert_ne!(keys[i], keys[j], "keys {i} and {j} must differ");
            }
            assert_ne!(keys[i], secret, "derived key {i} must differ from its parent");
        }
    }
}
