//! Request verbs and request-line splitting.

use std::fmt;

use crate::errors::{ProtocolError, Result};

/// Every verb a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Liveness check, answered with `TAHC`.
    Chat,
    /// Register or log in: `USER <username> <password>`.
    User,
    /// List connected usernames.
    Users,
    /// List channel names.
    Rooms,
    /// Join a channel: `JOIN [@]<channel>`.
    Join,
    /// Leave a channel: `PART [@]<channel>`.
    Part,
    /// List the members of a channel: `LIST [@]<channel>`.
    List,
    /// Send a chunked message: `SAY <target> <chunk>`.
    Say,
    /// Close the session, answered with `TIUQ`.
    Quit,
}

impl Verb {
    /// All verbs, in registry order.
    pub const ALL: [Self; 9] = [
        Self::Chat,
        Self::User,
        Self::Users,
        Self::Rooms,
        Self::Join,
        Self::Part,
        Self::List,
        Self::Say,
        Self::Quit,
    ];

    /// Canonical upper-case spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "CHAT",
            Self::User => "USER",
            Self::Users => "USERS",
            Self::Rooms => "ROOMS",
            Self::Join => "JOIN",
            Self::Part => "PART",
            Self::List => "LIST",
            Self::Say => "SAY",
            Self::Quit => "QUIT",
        }
    }

    /// Look up a verb, ignoring ASCII case.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|verb| raw.eq_ignore_ascii_case(verb.as_str().as_bytes()))
            .ok_or(ProtocolError::UnknownVerb)
    }

    /// Whether the verb needs an authenticated session.
    ///
    /// CHAT, USER and QUIT are open to everyone; everything else is gated.
    pub const fn requires_auth(self) -> bool {
        !matches!(self, Self::Chat | Self::User | Self::Quit)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip trailing `\r` and `\n` bytes.
pub fn trim_line_end(line: &[u8]) -> &[u8] {
    let end = line.iter().rposition(|b| *b != b'\r' && *b != b'\n').map_or(0, |pos| pos + 1);
    &line[..end]
}

/// Split a trimmed request line into `(verb, remainder)` at the first space.
///
/// The remainder is empty when the line has no space.
pub fn split_request_line(line: &[u8]) -> (&[u8], &[u8]) {
    match line.iter().position(|b| *b == b' ') {
        Some(pos) => (&line[..pos], &line[pos + 1..]),
        None => (line, &[][..]),
    }
}
