//! Wire format for the palaver chat protocol.
//!
//! Clients speak a line-oriented protocol: every request is a single line of
//! the form `<VERB>[ <data>]` and every reply is a single line of the form
//! `<CODE>[ <args...>]`. Message bodies that do not fit in one read are split
//! into self-describing chunk lines (see [`chunk`]), so a server reading
//! through a fixed-size buffer can reassemble arbitrarily long payloads one
//! line at a time.
//!
//! This crate is pure: it parses and encodes bytes and never touches a
//! socket. The dispatcher and the session workers live in `palaver-core` and
//! `palaver-server`.
//!
//! # Modules
//!
//! - [`verb`]: request verbs and request-line splitting
//! - [`name`]: validated usernames and channel names
//! - [`response`]: reply codes and their line encoding
//! - [`chunk`]: the chunk grammar (`<lenspec> <payload>` lines)
//! - [`message`]: chunked message assembly and relay framing
//! - [`errors`]: protocol error types
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chunk;
pub mod errors;
pub mod message;
pub mod name;
pub mod response;
pub mod verb;

pub use chunk::{Chunk, ChunkStatus, LenSpec, encode_payload};
pub use errors::{ProtocolError, Result};
pub use message::{CHANNEL_SENTINEL, Message, Target};
pub use name::Name;
pub use response::{Response, ResponseCode};
pub use verb::{Verb, split_request_line, trim_line_end};
