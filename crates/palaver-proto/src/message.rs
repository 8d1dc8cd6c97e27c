//! Chunked message assembly and relay framing.
//!
//! A SAY request carries a target and the first chunk line; further chunk
//! lines arrive as separate reads until the grammar in [`crate::chunk`] says
//! the message is complete. [`Message`] accumulates the chunk lines in
//! arrival order and, once complete, frames them for recipients:
//!
//! ```text
//! SAY @lobby C3 abc      ->  FROM alice C3 abc
//! C2 de                  ->  C2 de
//! C0                     ->  C0
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    chunk::{Chunk, ChunkStatus, encode_payload},
    errors::{ProtocolError, Result},
    verb::split_request_line,
};

/// Prefix that marks a message target as a channel.
pub const CHANNEL_SENTINEL: u8 = b'@';

/// Where a message is going.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// `@name`: every member of the channel.
    Channel(String),
    /// `name`: the session currently logged in as that user.
    User(String),
}

impl Target {
    /// Classify a raw target word.
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        match text.strip_prefix(CHANNEL_SENTINEL as char) {
            Some(channel) => Self::Channel(channel.to_owned()),
            None => Self::User(text.into_owned()),
        }
    }
}

/// A message being assembled from chunk lines, or a complete one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    target: Target,
    chunks: Vec<Bytes>,
    complete: bool,
}

impl Message {
    /// Start a message from the remainder of a SAY line (`<target> <chunk>`).
    ///
    /// Returns the message and whether more chunk lines are expected.
    pub fn begin(data: &[u8]) -> Result<(Self, ChunkStatus)> {
        let (target, first) = split_request_line(data);
        if target.is_empty() || first.is_empty() {
            return Err(ProtocolError::MissingArguments);
        }

        let mut message = Self { target: Target::parse(target), chunks: Vec::new(), complete: false };
        let status = message.push_chunk(first)?;
        Ok((message, status))
    }

    /// Build a complete message to `target` from a raw payload.
    pub fn from_payload(target: Target, payload: &[u8]) -> Self {
        Self { target, chunks: encode_payload(payload), complete: true }
    }

    /// Append one trimmed chunk line.
    ///
    /// The line is validated before it is stored; a rejected line leaves the
    /// message untouched.
    pub fn push_chunk(&mut self, line: &[u8]) -> Result<ChunkStatus> {
        if self.complete {
            return Err(ProtocolError::MessageComplete);
        }

        let status = Chunk::parse(line)?.status();
        self.chunks.push(Bytes::copy_from_slice(line));
        self.complete = status == ChunkStatus::Complete;
        Ok(status)
    }

    /// Message target.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Whether the final chunk has arrived.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Raw chunk lines, in arrival order.
    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// Concatenated chunk payloads (length specifiers stripped).
    pub fn payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for line in &self.chunks {
            // Every stored line already passed Chunk::parse
            if let Ok(chunk) = Chunk::parse(line) {
                out.extend_from_slice(chunk.payload);
            }
        }
        out
    }

    /// Frame the message for delivery: one `\n`-terminated line per chunk,
    /// with `FROM <sender> ` spliced in front of the first.
    pub fn relay(&self, sender: &str) -> Vec<Bytes> {
        self.chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| {
                let mut line = BytesMut::with_capacity(chunk.len() + sender.len() + 7);
                if index == 0 {
                    line.put_slice(b"FROM ");
                    line.put_slice(sender.as_bytes());
                    line.put_u8(b' ');
                }
                line.put_slice(chunk);
                line.put_u8(b'\n');
                line.freeze()
            })
            .collect()
    }
}
