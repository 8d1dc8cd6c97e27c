//! Validated identifiers.
//!
//! Usernames and channel names share one rule: non-empty and ASCII
//! alphanumeric only. A [`Name`] can only be built through that check, so
//! anything holding one can put it on the wire without escaping.

use std::{borrow::Borrow, fmt, str::FromStr};

use crate::errors::{ProtocolError, Result};

/// A non-empty, ASCII-alphanumeric username or channel name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(String);

impl Name {
    /// Validate `raw` and wrap it.
    pub fn parse(raw: &str) -> Result<Self> {
        if Self::is_valid(raw.as_bytes()) {
            Ok(Self(raw.to_owned()))
        } else {
            Err(ProtocolError::InvalidName)
        }
    }

    /// Validate raw request bytes and wrap them.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if Self::is_valid(raw) {
            // All bytes are ASCII, so this never loses data
            Ok(Self(String::from_utf8_lossy(raw).into_owned()))
        } else {
            Err(ProtocolError::InvalidName)
        }
    }

    /// Whether `raw` satisfies the name rule.
    pub fn is_valid(raw: &[u8]) -> bool {
        !raw.is_empty() && raw.iter().all(u8::is_ascii_alphanumeric)
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for Name {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
