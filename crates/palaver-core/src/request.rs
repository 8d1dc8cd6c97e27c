//! Request variants.
//!
//! One flat enum, one variant per verb. Each variant goes through the same
//! three steps:
//!
//! 1. [`authorize`]: a single predicate over the session's status, evaluated
//!    before any parsing
//! 2. [`Request::parse`]: turn the rest of the request line into a typed
//!    request, or into an [`Draft::Incomplete`] message that still needs
//!    chunk lines read from the connection
//! 3. [`Request::execute`]: run against the dispatcher and produce a reply
//!
//! Steps 1 and 2 run in the session worker, step 3 only inside the
//! dispatcher.

use std::fmt;

use palaver_proto::{
    CHANNEL_SENTINEL, ChunkStatus, Message, Name, ProtocolError, Response, Verb,
    split_request_line,
};

use crate::{
    credential::CredentialHasher,
    dispatcher::Dispatcher,
    env::Environment,
    error::ChatError,
    session::{SessionId, SessionStatus},
};

/// Shortest password USER accepts.
pub const MIN_PASSWORD_LEN: usize = 3;

/// Username and plaintext password from a USER request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Requested username.
    pub username: Name,
    password: Vec<u8>,
}

impl Credentials {
    /// Plaintext password bytes.
    pub fn password(&self) -> &[u8] {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A fully parsed request, ready for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Liveness check.
    Chat,
    /// Register or log in.
    User(Credentials),
    /// List logged-in usernames.
    Users,
    /// List channel names.
    Rooms,
    /// Join (and lazily create) a channel.
    Join(Name),
    /// Leave a channel.
    Part(Name),
    /// List a channel's members.
    List(Name),
    /// Deliver a complete message.
    Say(Message),
    /// End the session.
    Quit,
}

/// Outcome of [`Request::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draft {
    /// Nothing more to read.
    Ready(Request),
    /// A SAY whose body continues on later lines.
    Incomplete(Message),
}

/// Check whether a session with `status` may issue `verb`.
pub fn authorize(verb: Verb, status: &SessionStatus) -> Result<(), ChatError> {
    if verb.requires_auth() && !status.authenticated {
        return Err(ChatError::NotAuthorized);
    }
    Ok(())
}

impl Request {
    /// Parse the data that followed `verb` on the request line.
    ///
    /// `verb` is assumed to have passed [`authorize`] already.
    pub fn parse(verb: Verb, data: &[u8], status: &SessionStatus) -> Result<Draft, ChatError> {
        let request = match verb {
            Verb::Chat => Self::Chat,
            Verb::User => Self::User(parse_credentials(data, status)?),
            Verb::Users => Self::Users,
            Verb::Rooms => Self::Rooms,
            Verb::Join => Self::Join(parse_channel(data)?),
            Verb::Part => Self::Part(parse_channel(data)?),
            Verb::List => Self::List(parse_channel(data)?),
            Verb::Say => {
                let (message, chunk_status) = Message::begin(data)?;
                return Ok(match chunk_status {
                    ChunkStatus::Complete => Draft::Ready(Self::Say(message)),
                    ChunkStatus::More => Draft::Incomplete(message),
                });
            }
            Verb::Quit => Self::Quit,
        };
        Ok(Draft::Ready(request))
    }

    /// Verb this request was parsed from.
    pub fn verb(&self) -> Verb {
        match self {
            Self::Chat => Verb::Chat,
            Self::User(_) => Verb::User,
            Self::Users => Verb::Users,
            Self::Rooms => Verb::Rooms,
            Self::Join(_) => Verb::Join,
            Self::Part(_) => Verb::Part,
            Self::List(_) => Verb::List,
            Self::Say(_) => Verb::Say,
            Self::Quit => Verb::Quit,
        }
    }

    /// Run the request on behalf of `session`.
    pub fn execute<E, H>(
        self,
        session: SessionId,
        dispatcher: &mut Dispatcher<E, H>,
    ) -> Result<Response, ChatError>
    where
        E: Environment,
        H: CredentialHasher,
    {
        match self {
            Self::Chat => Ok(Response::chat_ack()),
            Self::User(credentials) => {
                dispatcher.login(session, credentials.username, &credentials.password)?;
                Ok(Response::ok())
            }
            Self::Users => Ok(Response::users(dispatcher.usernames())),
            Self::Rooms => Ok(Response::rooms(dispatcher.channel_names())),
            Self::Join(channel) => {
                dispatcher.join(session, channel)?;
                Ok(Response::ok())
            }
            Self::Part(channel) => {
                dispatcher.part(session, &channel)?;
                Ok(Response::ok())
            }
            Self::List(channel) => Ok(Response::list(dispatcher.members(&channel)?)),
            Self::Say(message) => {
                dispatcher.say(session, &message)?;
                Ok(Response::ok())
            }
            Self::Quit => {
                dispatcher.quit(session);
                Ok(Response::quit())
            }
        }
    }
}

fn parse_credentials(data: &[u8], status: &SessionStatus) -> Result<Credentials, ChatError> {
    if status.authenticated {
        return Err(ChatError::AlreadyLoggedIn);
    }

    let (username, password) = split_request_line(data);
    if username.is_empty() || password.is_empty() {
        return Err(ProtocolError::InvalidUserRequest.into());
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ProtocolError::PasswordTooShort.into());
    }

    Ok(Credentials { username: Name::from_bytes(username)?, password: password.to_vec() })
}

fn parse_channel(data: &[u8]) -> Result<Name, ChatError> {
    if data.is_empty() {
        return Err(ProtocolError::NoChannel.into());
    }

    // A lone "@" is kept and then rejected by the charset check
    let raw = match data.split_first() {
        Some((&CHANNEL_SENTINEL, rest)) if !rest.is_empty() => rest,
        _ => data,
    };

    Name::from_bytes(raw).map_err(|_| ChatError::from(ProtocolError::InvalidChannelName))
}
