//! Per-connection session state owned by the dispatcher.

use std::{fmt, net::SocketAddr};

use palaver_proto::Name;

/// Dispatcher-assigned session identifier.
pub type SessionId = u64;

/// Server-side state for one logical client connection.
///
/// Only the dispatcher mutates a session. Workers see the parts they need
/// through [`SessionStatus`] snapshots.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    username: Option<Name>,
    authenticated: bool,
    login_attempts: u32,
    messages_sent: u64,
}

impl Session {
    /// Fresh, unauthenticated session.
    pub fn new(id: SessionId, peer: SocketAddr) -> Self {
        Self { id, peer, username: None, authenticated: false, login_attempts: 0, messages_sent: 0 }
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Remote address of the underlying connection.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Username, once one has been claimed.
    pub fn username(&self) -> Option<&Name> {
        self.username.as_ref()
    }

    /// Whether the session has logged in.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Consecutive failed logins since the last success.
    pub fn login_attempts(&self) -> u32 {
        self.login_attempts
    }

    /// Successful SAY requests from this session.
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    pub(crate) fn authenticate(&mut self, username: Name) {
        self.username = Some(username);
        self.authenticated = true;
        self.login_attempts = 0;
    }

    /// Record a failed login and return the new attempt count.
    pub(crate) fn fail_login(&mut self) -> u32 {
        self.login_attempts += 1;
        self.login_attempts
    }

    /// Record a successful SAY and return the count before it.
    pub(crate) fn record_message(&mut self) -> u64 {
        let previous = self.messages_sent;
        self.messages_sent += 1;
        previous
    }

    /// Snapshot of the fields a worker may observe.
    pub fn status(&self) -> SessionStatus {
        SessionStatus { username: self.username.clone(), authenticated: self.authenticated }
    }
}

/// What a session worker knows about its own session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    /// Username, once claimed.
    pub username: Option<Name>,
    /// Whether the session has logged in.
    pub authenticated: bool,
}

impl SessionStatus {
    /// Log label: `user (addr)` once logged in, otherwise `addr`.
    pub fn label(&self, peer: SocketAddr) -> SessionLabel<'_> {
        SessionLabel { username: self.username.as_ref().filter(|_| self.authenticated), peer }
    }
}

/// Display adapter returned by [`SessionStatus::label`].
#[derive(Debug, Clone, Copy)]
pub struct SessionLabel<'a> {
    username: Option<&'a Name>,
    peer: SocketAddr,
}

impl fmt::Display for SessionLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.username {
            Some(name) => write!(f, "{name} ({})", self.peer),
            None => write!(f, "{}", self.peer),
        }
    }
}
