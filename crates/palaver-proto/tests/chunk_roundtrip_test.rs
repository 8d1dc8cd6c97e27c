//! Chunk grammar property tests.
//!
//! Payloads are encoded into chunk lines, fed back through the same assembly
//! path a session worker uses, and must come out byte-for-byte identical.

use palaver_proto::{ChunkStatus, Message, ProtocolError, encode_payload};
use proptest::prelude::*;

fn reassemble(lines: &[bytes::Bytes]) -> Result<Message, ProtocolError> {
    let (first, rest) = lines.split_first().ok_or(ProtocolError::MissingArguments)?;

    let mut say = b"bob ".to_vec();
    say.extend_from_slice(first);
    let (mut message, mut status) = Message::begin(&say)?;

    for line in rest {
        assert_eq!(status, ChunkStatus::More, "chunk after completion");
        status = message.push_chunk(line)?;
    }
    assert_eq!(status, ChunkStatus::Complete);
    Ok(message)
}

#[test]
fn boundary_lengths_round_trip() {
    for len in [0, 1, 98, 99, 100, 998, 999, 1000, 1998, 1999, 5000] {
        let payload: Vec<u8> = (0..len).map(|i| b'a' + (i % 26) as u8).collect();
        let message = reassemble(&encode_payload(&payload)).unwrap();
        assert_eq!(message.payload(), payload, "len {len}");
    }
}

#[test]
fn oversized_continuation_is_never_applied() {
    let (mut message, _) = Message::begin(b"@lobby C5 hello").unwrap();
    let before = message.clone();

    assert_eq!(message.push_chunk(b"C1000 x"), Err(ProtocolError::PacketTooLarge { limit: 999 }));
    assert_eq!(message, before);

    assert_eq!(message.push_chunk(b"C0").unwrap(), ChunkStatus::Complete);
    assert_eq!(message.payload(), b"hello");
}

proptest! {
    #[test]
    fn arbitrary_payloads_round_trip(payload in proptest::collection::vec(any::<u8>(), 0..=5000)) {
        let lines = encode_payload(&payload);
        if payload.len() <= 99 {
            prop_assert_eq!(lines.len(), 1);
        } else {
            prop_assert_eq!(lines.len(), payload.len().div_ceil(999) + 1);
        }

        let message = reassemble(&lines).unwrap();
        prop_assert_eq!(message.payload(), payload);
    }

    #[test]
    fn oversized_terminal_lengths_are_rejected(declared in 100u32..100_000) {
        let line = format!("{declared} x");
        let result = Message::begin(format!("bob {line}").as_bytes());
        prop_assert_eq!(result, Err(ProtocolError::PacketTooLarge { limit: 99 }));
    }
}
