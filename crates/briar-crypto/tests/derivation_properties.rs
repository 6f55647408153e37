//! Property-based tests for transport key derivation
//!
//! 1. **Symmetry**: initiator's outgoing keys == responder's incoming keys
//! 2. **Chain consistency**: stepping the chain == deriving directly
//! 3. **Distinctness**: no two keys of one period collide
//! 4. **Tag round-trip**: a tag matches only its own (key, stream number)

use briar_crypto::{
    SecretKey, derive_header_key, derive_period_secret, derive_tag_key, encode_tag, rotate_secret,
    tag_matches,
};
use briar_proto::{MAX_STREAM_NUMBER, PROTOCOL_VERSION};
use proptest::prelude::*;

fn arbitrary_key() -> impl Strategy<Value = SecretKey> {
    any::<[u8; 32]>().prop_map(SecretKey::from_bytes)
}

fn arbitrary_transport() -> impl Strategy<Value = String> {
    "[a-z.]{1,32}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_directional_keys_are_symmetric(
        master in arbitrary_key(),
        transport in arbitrary_transport(),
        period in 0u64..64,
    ) {
        let secret = derive_period_secret(&master, &transport, period);

        // Initiator outgoing == responder incoming
        prop_assert_eq!(derive_tag_key(&secret, false, true), derive_tag_key(&secret, true, false));
        prop_assert_eq!(
            derive_header_key(&secret, false, true),
            derive_header_key(&secret, true, false)
        );

        // Responder outgoing == initiator incoming
        prop_assert_eq!(derive_tag_key(&secret, false, false), derive_tag_key(&secret, true, true));
        prop_assert_eq!(
            derive_header_key(&secret, false, false),
            derive_header_key(&secret, true, true)
        );
    }

    #[test]
    fn prop_chain_steps_compose(
        master in arbitrary_key(),
        transport in arbitrary_transport(),
        period in 0u64..64,
        steps in 1u64..8,
    ) {
        let mut secret = derive_period_secret(&master, &transport, period);
        for p in (period + 1)..=(period + steps) {
            secret = rotate_secret(&secret, p);
        }
        prop_assert_eq!(secret, derive_period_secret(&master, &transport, period + steps));
    }

    #[test]
    fn prop_period_keys_are_distinct(master in arbitrary_key(), period in 0u64..16) {
        let transport = "org.briarproject.bramble.tcp";
        let mut keys = Vec::new();
        for p in period..period + 3 {
            let secret = derive_period_secret(&master, transport, p);
            for is_incoming in [false, true] {
                keys.push(derive_tag_key(&secret, is_incoming, true));
                keys.push(derive_header_key(&secret, is_incoming, true));
            }
        }

        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                prop_assert_ne!(&keys[i], &keys[j]);
            }
        }
    }

    #[test]
    fn prop_tag_matches_only_itself(
        key in arbitrary_key(),
        stream_number in 0..=MAX_STREAM_NUMBER,
        other in 0..=MAX_STREAM_NUMBER,
    ) {
        let tag = encode_tag(&key, PROTOCOL_VERSION, stream_number).unwrap();
        prop_assert!(tag_matches(&key, PROTOCOL_VERSION, stream_number, &tag));

        if other != stream_number {
            prop_assert!(!tag_matches(&key, PROTOCOL_VERSION, other, &tag));
        }
    }
}
