//! Property-based tests for encrypted stream framing
//!
//! These verify that:
//! - Whatever the writer emits, the reader returns byte for byte
//! - Any single bit flip after the tag is detected
//! - Packet delimiters are idempotent on both sides

use std::future::Future;

use briar_crypto::{FrameCipher, SecretKey};
use briar_proto::{
    FrameHeader, MAX_FRAME_LENGTH, MAX_PAYLOAD_LENGTH, MAX_PLAINTEXT_LENGTH, ProtocolError,
    TAG_LENGTH, frame_aad, frame_iv,
};
use briar_transport::{
    ContactId, StreamContext, StreamError, StreamReader, StreamWriter, TransportId,
};
use proptest::prelude::*;

fn context(stream_number: u64) -> StreamContext {
    StreamContext {
        contact_id: ContactId(1),
        transport_id: TransportId::new("tcp"),
        tag_key: SecretKey::from_bytes([0x10; 32]),
        header_key: SecretKey::from_bytes([0x20; 32]),
        stream_number,
    }
}

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(future)
}

/// Encode `packets` as one stream, each packet ended with `finish_packet`.
async fn encode(stream_number: u64, packets: &[Vec<u8>]) -> Vec<u8> {
    let mut writer = StreamWriter::open(Vec::new(), &context(stream_number)).await.unwrap();
    for packet in packets {
        writer.write(packet).await.unwrap();
        writer.finish_packet().await.unwrap();
    }
    writer.close().await.unwrap();
    writer.into_inner()
}

async fn decode(stream_number: u64, wire: &[u8]) -> Result<Vec<u8>, StreamError> {
    let mut reader = StreamReader::open(wire, &context(stream_number)).await?;
    reader.read_to_end().await
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_single_frame_roundtrip(
        len in 0..=MAX_PAYLOAD_LENGTH,
        is_final in any::<bool>(),
        stream_number in 0u64..=u64::from(u32::MAX),
    ) {
        let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();

        let decoded = block_on(async {
            let mut writer = StreamWriter::open(Vec::new(), &context(stream_number)).await.unwrap();
            writer.write_frame(&payload, is_final).await.unwrap();
            writer.close().await.unwrap();
            decode(stream_number, &writer.into_inner()).await
        })
        .unwrap();

        prop_assert_eq!(decoded, payload);
    }

    #[test]
    fn prop_packets_roundtrip(
        packets in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..5000), 0..6),
    ) {
        let expected: Vec<u8> = packets.concat();

        let decoded = block_on(async {
            let wire = encode(3, &packets).await;
            decode(3, &wire).await
        })
        .unwrap();

        prop_assert_eq!(decoded, expected);
    }

    #[test]
    fn prop_non_final_frames_have_fixed_length(
        packets in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..2000), 1..4),
    ) {
        let wire = block_on(encode(0, &packets));

        // Tag, one full-length frame per packet, then an empty final frame
        prop_assert_eq!(wire.len(), TAG_LENGTH + packets.len() * MAX_FRAME_LENGTH + 18);
    }

    #[test]
    fn prop_bit_flip_is_detected(
        data in prop::collection::vec(any::<u8>(), 0..100),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let wire = block_on(encode(1, &[data]));
        let mut tampered = wire.clone();
        let index = TAG_LENGTH + position.index(wire.len() - TAG_LENGTH);
        tampered[index] ^= 1 << bit;

        let result = block_on(decode(1, &tampered));
        prop_assert_eq!(result, Err(StreamError::Authentication));
    }

    #[test]
    fn prop_chunked_reads_match(
        data in prop::collection::vec(any::<u8>(), 0..70_000),
        chunk in 1usize..5000,
    ) {
        let read = block_on(async {
            let wire = encode(2, &[data.clone()]).await;
            let mut reader = StreamReader::open(wire.as_slice(), &context(2)).await.unwrap();

            let mut out = Vec::new();
            let mut buf = vec![0u8; chunk];
            loop {
                let n = reader.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
            }
            out
        });

        prop_assert_eq!(read, data);
    }
}

#[test]
fn payload_boundaries_roundtrip() {
    for len in [0, 1, MAX_PAYLOAD_LENGTH - 1, MAX_PAYLOAD_LENGTH] {
        for is_final in [false, true] {
            let payload = vec![0x5A; len];
            let decoded = block_on(async {
                let mut writer = StreamWriter::open(Vec::new(), &context(0)).await.unwrap();
                writer.write_frame(&payload, is_final).await.unwrap();
                writer.close().await.unwrap();
                decode(0, &writer.into_inner()).await
            })
            .unwrap();

            assert_eq!(decoded, payload, "len {len}, final {is_final}");
        }
    }
}

#[test]
fn delimiters_are_idempotent() {
    let (once, twice) = block_on(async {
        let mut once = StreamWriter::open(Vec::new(), &context(0)).await.unwrap();
        once.write(b"a").await.unwrap();
        once.finish_packet().await.unwrap();
        once.write(b"b").await.unwrap();
        once.close().await.unwrap();

        let mut twice = StreamWriter::open(Vec::new(), &context(0)).await.unwrap();
        twice.write(b"a").await.unwrap();
        twice.finish_packet().await.unwrap();
        twice.finish_packet().await.unwrap();
        twice.write(b"b").await.unwrap();
        twice.close().await.unwrap();

        (once.into_inner(), twice.into_inner())
    });

    assert_eq!(once, twice);
}

#[test]
fn reordered_frames_fail_authentication() {
    let wire = block_on(encode(4, &[b"first".to_vec(), b"second".to_vec()]));

    let frames = &wire[TAG_LENGTH..];
    let (first, rest) = frames.split_at(MAX_FRAME_LENGTH);
    let (second, last) = rest.split_at(MAX_FRAME_LENGTH);

    let mut swapped = wire[..TAG_LENGTH].to_vec();
    swapped.extend_from_slice(second);
    swapped.extend_from_slice(first);
    swapped.extend_from_slice(last);

    assert_eq!(block_on(decode(4, &swapped)), Err(StreamError::Authentication));
}

#[test]
fn dropped_frame_fails_authentication() {
    let wire = block_on(encode(4, &[b"first".to_vec(), b"second".to_vec()]));

    let mut dropped = wire[..TAG_LENGTH].to_vec();
    dropped.extend_from_slice(&wire[TAG_LENGTH + MAX_FRAME_LENGTH..]);

    assert_eq!(block_on(decode(4, &dropped)), Err(StreamError::Authentication));
}

#[test]
fn frames_from_another_stream_fail_authentication() {
    let wire = block_on(encode(5, &[b"payload".to_vec()]));
    let tag_for_six = block_on(encode(6, &[]))[..TAG_LENGTH].to_vec();

    let mut spliced = tag_for_six;
    spliced.extend_from_slice(&wire[TAG_LENGTH..]);

    assert_eq!(block_on(decode(6, &spliced)), Err(StreamError::Authentication));
}

/// Seal hand-built plaintexts as consecutive frames of stream 8, bypassing
/// the writer's checks.
fn seal_frames(plaintexts: &[Vec<u8>]) -> Vec<u8> {
    let context = context(8);
    let cipher = FrameCipher::new(&context.header_key);

    let mut wire = context.tag().unwrap().to_vec();
    for (frame_number, plaintext) in (0u32..).zip(plaintexts) {
        let iv = frame_iv(8, frame_number);
        let aad = frame_aad(frame_number, plaintext.len());
        wire.extend_from_slice(&cipher.seal(&iv, &aad, plaintext));
    }
    wire
}

fn plaintext(payload: &[u8], is_final: bool, total_len: usize) -> Vec<u8> {
    let header = FrameHeader::new(payload.len(), is_final).unwrap();
    let mut plaintext = header.to_bytes().to_vec();
    plaintext.extend_from_slice(payload);
    plaintext.resize(total_len, 0);
    plaintext
}

#[test]
fn short_non_final_frame_is_rejected() {
    let wire = seal_frames(&[plaintext(b"short", false, 7)]);

    let result = block_on(decode(8, &wire));
    assert!(matches!(
        result,
        Err(StreamError::InvalidFrame(ProtocolError::ShortFrame { .. }))
    ));
}

#[test]
fn non_zero_padding_is_rejected() {
    let mut padded = plaintext(b"hello", false, MAX_PLAINTEXT_LENGTH);
    padded[MAX_PLAINTEXT_LENGTH - 1] = 1;
    let wire = seal_frames(&[padded, plaintext(b"", true, 2)]);

    let result = block_on(decode(8, &wire));
    assert!(matches!(
        result,
        Err(StreamError::InvalidFrame(ProtocolError::InvalidPadding { .. }))
    ));
}

#[test]
fn payload_beyond_plaintext_is_rejected() {
    // Header claims 100 bytes, only 10 follow
    let mut overrun = FrameHeader::new(100, true).unwrap().to_bytes().to_vec();
    overrun.extend_from_slice(&[7; 10]);
    let wire = seal_frames(&[overrun]);

    let result = block_on(decode(8, &wire));
    assert!(matches!(
        result,
        Err(StreamError::InvalidFrame(ProtocolError::PayloadOverrun { .. }))
    ));
}

#[test]
fn hand_sealed_frames_are_accepted() {
    let wire = seal_frames(&[
        plaintext(b"abc", false, MAX_PLAINTEXT_LENGTH),
        plaintext(b"def", true, 5),
    ]);

    assert_eq!(block_on(decode(8, &wire)).unwrap(), b"abcdef");
}
