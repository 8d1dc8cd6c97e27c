//! Chunk grammar for message bodies.
//!
//! A chunk is one line of the form `<lenspec> <payload>`:
//!
//! ```text
//! lenspec := D        terminal chunk, D <= 99, the message ends here
//!          | "C" D    continuation chunk, D <= 999
//!                     "C0" (empty payload) terminates a chunked message
//! ```
//!
//! The declared length is advisory: the payload is everything after the
//! first space. Only the cap on the declared value is enforced, and a
//! rejected chunk is never appended to a message.

use bytes::Bytes;

use crate::errors::{ProtocolError, Result};

/// Largest declared length of a terminal (short-form) chunk.
pub const MAX_TERMINAL_LEN: u32 = 99;

/// Largest declared length of a continuation chunk.
pub const MAX_CONTINUATION_LEN: u32 = 999;

/// Parsed length specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LenSpec {
    /// `D`: the only (or last) chunk of a message.
    Terminal(u32),
    /// `CD`: more chunks follow unless `D` is zero.
    Continuation(u32),
}

/// Whether a message needs more chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// The message is complete.
    Complete,
    /// At least one more chunk line is expected.
    More,
}

/// A chunk line, borrowed from the read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Length specifier.
    pub spec: LenSpec,
    /// Bytes after the first space (empty if there is none).
    pub payload: &'a [u8],
}

impl<'a> Chunk<'a> {
    /// Parse one trimmed chunk line.
    pub fn parse(line: &'a [u8]) -> Result<Self> {
        let (head, payload) = match line.iter().position(|b| *b == b' ') {
            Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
            None => (line, None),
        };

        if let Some(digits) = head.strip_prefix(b"C") {
            let declared = parse_decimal(digits, MAX_CONTINUATION_LEN)?;
            return Ok(Self { spec: LenSpec::Continuation(declared), payload: payload.unwrap_or(&[]) });
        }

        // Short form must carry a separator, even for an empty payload
        let payload = payload.ok_or(ProtocolError::MalformedPacket)?;
        let declared = parse_decimal(head, MAX_TERMINAL_LEN)?;
        Ok(Self { spec: LenSpec::Terminal(declared), payload })
    }

    /// What this chunk means for the message it belongs to.
    pub fn status(&self) -> ChunkStatus {
        match self.spec {
            LenSpec::Continuation(n) if n > 0 => ChunkStatus::More,
            LenSpec::Continuation(_) | LenSpec::Terminal(_) => ChunkStatus::Complete,
        }
    }
}

fn parse_decimal(digits: &[u8], limit: u32) -> Result<u32> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(ProtocolError::MalformedPacket);
    }

    let value = digits.iter().try_fold(0u32, |acc, digit| {
        acc.checked_mul(10).and_then(|acc| acc.checked_add(u32::from(digit - b'0')))
    });

    match value {
        Some(value) if value > limit => Err(ProtocolError::PacketTooLarge { limit }),
        // Padded specs such as `007` stay within the cap but are still too long
        Some(_) if digits.len() > decimal_width(limit) => Err(ProtocolError::MalformedPacket),
        Some(value) => Ok(value),
        None => Err(ProtocolError::PacketTooLarge { limit }),
    }
}

fn decimal_width(limit: u32) -> usize {
    std::iter::successors(Some(limit), |n| (*n >= 10).then(|| n / 10)).count()
}

/// Split a payload into chunk lines (without line terminators).
///
/// Payloads up to [`MAX_TERMINAL_LEN`] bytes become a single terminal chunk;
/// longer ones become continuation chunks of at most
/// [`MAX_CONTINUATION_LEN`] bytes followed by `C0`.
pub fn encode_payload(payload: &[u8]) -> Vec<Bytes> {
    if payload.len() <= MAX_TERMINAL_LEN as usize {
        return vec![chunk_line(&payload.len().to_string(), payload)];
    }

    let mut lines: Vec<Bytes> = payload
        .chunks(MAX_CONTINUATION_LEN as usize)
        .map(|piece| chunk_line(&format!("C{}", piece.len()), piece))
        .collect();
    lines.push(Bytes::from_static(b"C0"));
    lines
}

fn chunk_line(spec: &str, payload: &[u8]) -> Bytes {
    let mut line = Vec::with_capacity(spec.len() + 1 + payload.len());
    line.extend_from_slice(spec.as_bytes());
    line.push(b' ');
    line.extend_from_slice(payload);
    Bytes::from(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_chunk() {
        let chunk = Chunk::parse(b"5 hello").unwrap();
        assert_eq!(chunk.spec, LenSpec::Terminal(5));
        assert_eq!(chunk.payload, b"hello");
        assert_eq!(chunk.status(), ChunkStatus::Complete);
    }

    #[test]
    fn terminal_payload_keeps_inner_spaces() {
        let chunk = Chunk::parse(b"11 hello world").unwrap();
        assert_eq!(chunk.payload, b"hello world");
    }

    #[test]
    fn empty_terminal_chunk_needs_separator() {
        assert_eq!(Chunk::parse(b"0 ").unwrap().payload, b"");
        assert_eq!(Chunk::parse(b"0"), Err(ProtocolError::MalformedPacket));
    }

    #[test]
    fn continuation_chunks() {
        let chunk = Chunk::parse(b"C3 abc").unwrap();
        assert_eq!(chunk.spec, LenSpec::Continuation(3));
        assert_eq!(chunk.status(), ChunkStatus::More);

        let end = Chunk::parse(b"C0").unwrap();
        assert_eq!(end.spec, LenSpec::Continuation(0));
        assert_eq!(end.status(), ChunkStatus::Complete);
        assert_eq!(Chunk::parse(b"C0 ").unwrap().status(), ChunkStatus::Complete);
    }

    #[test]
    fn caps_are_enforced() {
        assert!(Chunk::parse(b"99 x").is_ok());
        assert_eq!(Chunk::parse(b"100 x"), Err(ProtocolError::PacketTooLarge { limit: 99 }));
        assert!(Chunk::parse(b"C999 x").is_ok());
        assert_eq!(Chunk::parse(b"C1000 x"), Err(ProtocolError::PacketTooLarge { limit: 999 }));
        assert_eq!(
            Chunk::parse(b"C99999999999999999999 x"),
            Err(ProtocolError::PacketTooLarge { limit: 999 })
        );
    }

    #[test]
    fn spec_width_is_bounded() {
        assert_eq!(Chunk::parse(b"07 x").unwrap().spec, LenSpec::Terminal(7));
        assert_eq!(Chunk::parse(b"C099 x").unwrap().spec, LenSpec::Continuation(99));
        assert_eq!(Chunk::parse(b"C00").unwrap().spec, LenSpec::Continuation(0));

        let lines: [&[u8]; 4] = [b"007 x", b"000 x", b"C0001 x", b"C0000"];
        for line in lines {
            assert_eq!(Chunk::parse(line), Err(ProtocolError::MalformedPacket), "{line:?}");
        }
        // Over the cap wins over width
        assert_eq!(Chunk::parse(b"0100 x"), Err(ProtocolError::PacketTooLarge { limit: 99 }));
    }

    #[test]
    fn malformed_specs() {
        let lines: [&[u8]; 9] =
            [b"", b"hello", b"x5 hi", b"-5 hi", b"+5 hi", b"C", b"C x", b"Cx hi", b" 5 hi"];
        for line in lines {
            assert_eq!(Chunk::parse(line), Err(ProtocolError::MalformedPacket), "{line:?}");
        }
    }

    #[test]
    fn short_payload_encodes_as_one_line() {
        assert_eq!(encode_payload(b"hello"), vec![Bytes::from_static(b"5 hello")]);
        assert_eq!(encode_payload(b""), vec![Bytes::from_static(b"0 ")]);
    }

    #[test]
    fn long_payload_is_split_and_terminated() {
        let payload = vec![b'x'; 1500];
        let lines = encode_payload(&payload);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(b"C999 "));
        assert!(lines[1].starts_with(b"C501 "));
        assert_eq!(lines[2], Bytes::from_static(b"C0"));
    }

    #[test]
    fn hundred_bytes_switches_to_continuation_form() {
        let lines = encode_payload(&[b'a'; 100]);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(b"C100 "));
    }
}
