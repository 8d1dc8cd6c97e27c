//! Chat error types.
//!
//! [`ChatError`] is what a request can fail with once it reaches the core.
//! Every variant maps to exactly one [`ErrorKind`]; the kind alone decides
//! whether the session survives the failure.

use palaver_proto::ProtocolError;
use thiserror::Error;

use crate::credential::CredentialError;

/// Failure raised while parsing, authorizing or executing a request.
///
/// `Display` strings are sent verbatim to clients after `ERROR `.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Malformed input.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The verb needs an authenticated session.
    #[error("Not authorized to do this")]
    NotAuthorized,

    /// USER from a session that is already logged in.
    #[error("You are already logged in")]
    AlreadyLoggedIn,

    /// The username is held by another live session.
    #[error("This username is already in the channel")]
    UsernameInUse,

    /// Wrong password for an existing identity.
    #[error("Invalid password specified for user")]
    InvalidPassword,

    /// Wrong password too many times in a row.
    #[error("Max login tries. Bye")]
    TooManyLoginAttempts,

    /// The named channel has never been created.
    #[error("Channel does not exist")]
    ChannelNotFound,

    /// PART from a channel the session is not in.
    #[error("You are not in this channel")]
    NotChannelMember,

    /// SAY to a username with no live session.
    #[error("Client not found")]
    UserNotFound,

    /// The request names a session the dispatcher does not know.
    #[error("Unknown session")]
    UnknownSession,

    /// Credential hashing failed.
    #[error("Could not process credentials")]
    Credential(#[from] CredentialError),
}

/// Coarse classification of a [`ChatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed frame, unknown verb or oversized chunk.
    Protocol,
    /// Missing authentication, or a login conflict.
    Authorization,
    /// Channel or user lookups that came up empty.
    Application,
    /// Reported, then the connection is closed.
    Fatal,
    /// A server-side failure unrelated to the request's content.
    Internal,
}

impl ChatError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::NotAuthorized
            | Self::AlreadyLoggedIn
            | Self::UsernameInUse
            | Self::InvalidPassword => ErrorKind::Authorization,
            Self::ChannelNotFound | Self::NotChannelMember | Self::UserNotFound => {
                ErrorKind::Application
            }
            Self::TooManyLoginAttempts => ErrorKind::Fatal,
            Self::UnknownSession | Self::Credential(_) => ErrorKind::Internal,
        }
    }

    /// Whether the session must be closed after reporting this error.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_facing_messages() {
        assert_eq!(ChatError::UsernameInUse.to_string(), "This username is already in the channel");
        assert_eq!(ChatError::TooManyLoginAttempts.to_string(), "Max login tries. Bye");
        assert_eq!(
            ChatError::from(ProtocolError::UnknownVerb).to_string(),
            "Invalid request code"
        );
    }

    #[test]
    fn only_login_exhaustion_is_fatal() {
        assert!(ChatError::TooManyLoginAttempts.is_fatal());
        assert!(!ChatError::InvalidPassword.is_fatal());
        assert!(!ChatError::from(ProtocolError::MalformedPacket).is_fatal());
        assert_eq!(ChatError::NotChannelMember.kind(), ErrorKind::Application);
        assert_eq!(ChatError::from(CredentialError::ZeroIterations).kind(), ErrorKind::Internal);
    }
}
