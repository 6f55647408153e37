//! Pseudo-random stream tags.
//!
//! `tag = HMAC-SHA256(tag_key, u16be(protocol_version) || u64be(stream_number))`
//! truncated to [`TAG_LENGTH`] bytes.
//!
//! A tag is the first thing on the wire. It must look random to anyone
//! without the tag key and must never repeat, which is why stream numbers are
//! never reused under the same key.

use briar_proto::{MAX_STREAM_NUMBER, TAG_LENGTH, Tag};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{error::CryptoError, key::SecretKey};

type HmacSha256 = Hmac<Sha256>;

/// Compute the tag for `stream_number`.
///
/// # Errors
///
/// - `CryptoError::StreamNumberOutOfRange` if `stream_number` exceeds
///   [`MAX_STREAM_NUMBER`]
pub fn encode_tag(
    tag_key: &SecretKey,
    protocol_version: u16,
    stream_number: u64,
) -> Result<Tag, CryptoError> {
    let mac = tag_mac(tag_key, protocol_version, stream_number)?;
    let digest = mac.finalize().into_bytes();

    let mut tag = [0u8; TAG_LENGTH];
    tag.copy_from_slice(&digest[..TAG_LENGTH]);
    Ok(tag)
}

/// Check whether `candidate` is the tag for `stream_number`.
///
/// Comparison is constant time. Returns `false` for candidates of the wrong
/// length and for out-of-range stream numbers.
pub fn tag_matches(
    tag_key: &SecretKey,
    protocol_version: u16,
    stream_number: u64,
    candidate: &[u8],
) -> bool {
    if candidate.len() != TAG_LENGTH {
        return false;
    }

    match tag_mac(tag_key, protocol_version, stream_number) {
        Ok(mac) => mac.verify_truncated_left(candidate).is_ok(),
        Err(_) => false,
    }
}

fn tag_mac(
    tag_key: &SecretKey,
    protocol_version: u16,
    stream_number: u64,
) -> Result<HmacSha256, CryptoError> {
    if stream_number > MAX_STREAM_NUMBER {
        return Err(CryptoError::StreamNumberOutOfRange { stream_number, max: MAX_STREAM_NUMBER });
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(tag_key.as_bytes()) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(&protocol_version.to_be_bytes());
    mac.update(&stream_number.to_be_bytes());
    Ok(mac)
}
