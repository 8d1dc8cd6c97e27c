//! Reply codes and their line encoding.
//!
//! A reply is `<CODE>[ <arg>...]\n`. Exactly one reply is written per request;
//! relayed messages (`FROM ...`) are not replies and are framed by
//! [`crate::Message::relay`] instead.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// Reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// Acknowledges `CHAT`.
    Tahc,
    /// Generic success.
    Ok,
    /// Failure; the single argument is a human-readable message.
    Error,
    /// Acknowledges `QUIT`; the connection closes after it is flushed.
    Tiuq,
    /// Connected usernames.
    Users,
    /// Channel names.
    Rooms,
    /// Members of one channel.
    List,
}

impl ResponseCode {
    /// Wire spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tahc => "TAHC",
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::Tiuq => "TIUQ",
            Self::Users => "USERS",
            Self::Rooms => "ROOMS",
            Self::List => "LIST",
        }
    }
}

/// A reply to a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    code: ResponseCode,
    args: Vec<String>,
    terminal: bool,
}

impl Response {
    fn new(code: ResponseCode) -> Self {
        Self { code, args: Vec::new(), terminal: false }
    }

    fn with_args<I, S>(code: ResponseCode, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: fmt::Display,
    {
        Self { code, args: args.into_iter().map(|arg| arg.to_string()).collect(), terminal: false }
    }

    /// `TAHC`
    pub fn chat_ack() -> Self {
        Self::new(ResponseCode::Tahc)
    }

    /// `OK`
    pub fn ok() -> Self {
        Self::new(ResponseCode::Ok)
    }

    /// `ERROR <message>`; the connection stays open.
    pub fn error(message: impl fmt::Display) -> Self {
        Self::with_args(ResponseCode::Error, [message])
    }

    /// `ERROR <message>` that also closes the connection once written.
    pub fn fatal(message: impl fmt::Display) -> Self {
        Self { terminal: true, ..Self::error(message) }
    }

    /// `TIUQ`; the connection closes once written.
    pub fn quit() -> Self {
        Self { terminal: true, ..Self::new(ResponseCode::Tiuq) }
    }

    /// `USERS <name>...`
    pub fn users<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: fmt::Display,
    {
        Self::with_args(ResponseCode::Users, names)
    }

    /// `ROOMS <name>...`
    pub fn rooms<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: fmt::Display,
    {
        Self::with_args(ResponseCode::Rooms, names)
    }

    /// `LIST <name>...`
    pub fn list<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: fmt::Display,
    {
        Self::with_args(ResponseCode::List, names)
    }

    /// Reply code.
    pub fn code(&self) -> ResponseCode {
        self.code
    }

    /// Reply arguments, in order.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Whether the session must be closed after this reply is flushed.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Encode as a single `\n`-terminated line.
    pub fn encode(&self) -> Bytes {
        let len = self.code.as_str().len() + self.args.iter().map(|a| a.len() + 1).sum::<usize>();
        let mut buf = BytesMut::with_capacity(len + 1);
        buf.put_slice(self.code.as_str().as_bytes());
        for arg in &self.args {
            buf.put_u8(b' ');
            buf.put_slice(arg.as_bytes());
        }
        buf.put_u8(b'\n');
        buf.freeze()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code.as_str())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
