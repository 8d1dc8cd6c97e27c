//! Protocol error types.
//!
//! Every variant is recoverable: the session that produced it gets an
//! `ERROR <message>` reply and its connection stays open. The `Display`
//! strings are the exact text sent to clients.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while parsing requests or chunk lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The first word of the request line is not a known verb.
    #[error("Invalid request code")]
    UnknownVerb,

    /// A chunk line whose length specifier does not follow the grammar.
    #[error("Malformed packet")]
    MalformedPacket,

    /// A chunk line whose declared length exceeds its format's cap.
    #[error("Packet size too large (limit {limit})")]
    PacketTooLarge {
        /// Largest length the chunk's format accepts.
        limit: u32,
    },

    /// A chunk arrived after the message was already complete.
    #[error("Message already complete")]
    MessageComplete,

    /// A username or channel name contains characters outside `[A-Za-z0-9]`.
    #[error("Invalid name chars provided")]
    InvalidName,

    /// SAY without both a target and a body.
    #[error("Missing argument(s)")]
    MissingArguments,

    /// USER without both a username and a password.
    #[error("Invalid User Request")]
    InvalidUserRequest,

    /// USER with a password shorter than three bytes.
    #[error("Password is too short")]
    PasswordTooShort,

    /// JOIN, PART or LIST without a channel name.
    #[error("No channel specified")]
    NoChannel,

    /// JOIN, PART or LIST with a channel name outside `[A-Za-z0-9]`.
    #[error("Invalid characters for channel name")]
    InvalidChannelName,
}
