//! Feed arbitrary lines through the chunk grammar.
//!
//! The first line starts a SAY body, every later line is pushed as a chunk.
//! Parsing must never panic, a rejected chunk must leave the message
//! unchanged, and a completed message must refuse further chunks.

#![no_main]

use libfuzzer_sys::fuzz_target;
use palaver_proto::{ChunkStatus, Message, ProtocolError};

fuzz_target!(|data: &[u8]| {
    let mut lines = data.split(|b| *b == b'\n');
    let Some(first) = lines.next() else {
        return;
    };
    let Ok((mut message, mut status)) = Message::begin(first) else {
        return;
    };

    for line in lines {
        let before = message.chunks().len();
        match message.push_chunk(line) {
            Ok(next) => {
                assert_eq!(message.chunks().len(), before + 1);
                status = next;
            }
            Err(ProtocolError::MessageComplete) => {
                assert_eq!(status, ChunkStatus::Complete);
                assert_eq!(message.chunks().len(), before);
            }
            Err(_) => assert_eq!(message.chunks().len(), before),
        }
    }

    let relayed = message.relay("fuzz");
    assert_eq!(relayed.len(), message.chunks().len());
    assert!(relayed.iter().all(|line| line.ends_with(b"\n")));
});
