//! Known-answer tests pinning the derivation chain, tag encoding and frame
//! cipher to fixed byte values.
//!
//! Any change to labels, byte order or truncation breaks interoperability
//! with existing peers and shows up here first.

use briar_crypto::{
    FrameCipher, SecretKey, derive_initial_secret, derive_period_secret, derive_tag_key,
    encode_tag, rotate_secret,
};
use briar_proto::{Frame, PROTOCOL_VERSION, frame_aad, frame_iv};

const TRANSPORT: &str = "org.briarproject.bramble.tcp";

fn master() -> SecretKey {
    SecretKey::from_bytes(*b"test_master_secret_material_here")
}

fn hex_key(s: &str) -> SecretKey {
    SecretKey::from_slice(&hex::decode(s).unwrap()).unwrap()
}

#[test]
fn period_chain_vectors() {
    let s0 = derive_initial_secret(&master(), TRANSPORT);
    assert_eq!(s0, hex_key("169d385ec08b95d5d0957b468a02592257cacb5762e1d74438ae23b7cb23a69b"));

    let s1 = rotate_secret(&s0, 1);
    assert_eq!(s1, hex_key("cee3ec365cb00a6a76e7d92fd06bbf0de7986f690c094ae67fc4fb53b60f4055"));
    assert_eq!(s1, derive_period_secret(&master(), TRANSPORT, 1));
}

#[test]
fn tag_vector() {
    let s1 = derive_period_secret(&master(), TRANSPORT, 1);

    // Initiator's outgoing tag key
    let tag_key = derive_tag_key(&s1, false, true);
    assert_eq!(
        tag_key,
        hex_key("1fa1767e4e2970739cfb313a5bd49c6a3c29753851f4d196c38f9343b7c52373")
    );

    let tag = encode_tag(&tag_key, PROTOCOL_VERSION, 0).unwrap();
    assert_eq!(hex::encode(tag), "398d9793d977b7408edb99131c81f776");
}

#[test]
fn frame_cipher_vector() {
    let cipher = FrameCipher::new(&SecretKey::from_bytes([0x42; 32]));
    let plaintext = Frame::new(&b"hello"[..], true).unwrap().to_plaintext();

    let sealed =
        cipher.seal(&frame_iv(1, 0), &frame_aad(0, plaintext.len()), &plaintext);
    assert_eq!(hex::encode(&sealed), "714cae6c94bf05d7b3b8504b8d1b742ca8f4531faabc28");
}
