//! Reference model of the chat state.
//!
//! [`ModelWorld`] is a deliberately naive re-statement of the dispatcher's
//! rules: plain maps, no hashing, no actions. Model-based tests run the same
//! [`Operation`] sequence through the model and through the real dispatcher
//! and require identical replies and identical delivered lines.

use std::collections::{BTreeMap, HashMap};

use palaver_core::ChatError;

/// Index of a simulated client.
pub type ClientId = u8;

/// Index into [`CHANNELS`].
pub type ModelChannel = u8;

/// Channel names operations draw from.
pub const CHANNELS: [&str; 3] = ["lobby", "rust", "ops"];

/// Usernames operations draw from. Fewer names than clients forces clashes.
pub const NAMES: [&str; 3] = ["alice", "bob", "carol"];

/// Passwords operations draw from.
pub const PASSWORDS: [&str; 2] = ["hunter2", "swordfish"];

/// Failed logins allowed per session, matching the dispatcher default.
pub const MAX_LOGIN_ATTEMPTS: u32 = 3;

fn pick<T: Copy>(pool: &[T], index: u8) -> T {
    pool[usize::from(index) % pool.len()]
}

/// One step a client can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Open a connection if the client has none.
    Connect {
        /// Acting client.
        client_id: ClientId,
    },
    /// `USER <name> <password>`
    Login {
        /// Acting client.
        client_id: ClientId,
        /// Index into [`NAMES`].
        name: u8,
        /// Index into [`PASSWORDS`].
        password: u8,
    },
    /// `JOIN <channel>`
    Join {
        /// Acting client.
        client_id: ClientId,
        /// Channel index.
        channel: ModelChannel,
    },
    /// `PART <channel>`
    Part {
        /// Acting client.
        client_id: ClientId,
        /// Channel index.
        channel: ModelChannel,
    },
    /// `LIST <channel>`
    List {
        /// Acting client.
        client_id: ClientId,
        /// Channel index.
        channel: ModelChannel,
    },
    /// `SAY @<channel> ...`
    SayChannel {
        /// Acting client.
        client_id: ClientId,
        /// Channel index.
        channel: ModelChannel,
        /// Seed for the message body.
        content: u8,
    },
    /// `SAY <name> ...`
    SayUser {
        /// Acting client.
        client_id: ClientId,
        /// Index into [`NAMES`].
        name: u8,
        /// Seed for the message body.
        content: u8,
    },
    /// `USERS`
    Users {
        /// Acting client.
        client_id: ClientId,
    },
    /// `ROOMS`
    Rooms {
        /// Acting client.
        client_id: ClientId,
    },
    /// `QUIT`
    Quit {
        /// Acting client.
        client_id: ClientId,
    },
}

impl Operation {
    /// Client performing the operation.
    pub fn client_id(&self) -> ClientId {
        match self {
            Self::Connect { client_id }
            | Self::Login { client_id, .. }
            | Self::Join { client_id, .. }
            | Self::Part { client_id, .. }
            | Self::List { client_id, .. }
            | Self::SayChannel { client_id, .. }
            | Self::SayUser { client_id, .. }
            | Self::Users { client_id }
            | Self::Rooms { client_id }
            | Self::Quit { client_id } => *client_id,
        }
    }

    /// Same operation performed by `client_id`.
    #[must_use]
    pub fn with_client(mut self, id: ClientId) -> Self {
        match &mut self {
            Self::Connect { client_id }
            | Self::Login { client_id, .. }
            | Self::Join { client_id, .. }
            | Self::Part { client_id, .. }
            | Self::List { client_id, .. }
            | Self::SayChannel { client_id, .. }
            | Self::SayUser { client_id, .. }
            | Self::Users { client_id }
            | Self::Rooms { client_id }
            | Self::Quit { client_id } => *client_id = id,
        }
        self
    }

    /// Wire request line, or `None` for [`Operation::Connect`].
    pub fn request_line(&self) -> Option<String> {
        let line = match self {
            Self::Connect { .. } => return None,
            Self::Login { name, password, .. } => {
                format!("USER {} {}", pick(&NAMES, *name), pick(&PASSWORDS, *password))
            }
            Self::Join { channel, .. } => format!("JOIN {}", pick(&CHANNELS, *channel)),
            Self::Part { channel, .. } => format!("PART {}", pick(&CHANNELS, *channel)),
            Self::List { channel, .. } => format!("LIST {}", pick(&CHANNELS, *channel)),
            Self::SayChannel { channel, content, .. } => {
                format!("SAY @{} {}", pick(&CHANNELS, *channel), chunk(*content))
            }
            Self::SayUser { name, content, .. } => {
                format!("SAY {} {}", pick(&NAMES, *name), chunk(*content))
            }
            Self::Users { .. } => "USERS".to_owned(),
            Self::Rooms { .. } => "ROOMS".to_owned(),
            Self::Quit { .. } => "QUIT".to_owned(),
        };
        Some(line)
    }
}

fn chunk(content: u8) -> String {
    let body = format!("m{content}");
    format!("{} {body}", body.len())
}

/// Observable outcome of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// The client has a connection (new or existing).
    Connected,
    /// The reply line, without its terminator.
    Reply(String),
    /// The client had no connection, so nothing was sent.
    NotConnected,
}

impl OperationResult {
    fn error(err: &ChatError) -> Self {
        Self::Reply(format!("ERROR {err}"))
    }

    fn listing(code: &str, names: &[&str]) -> Self {
        let mut line = code.to_owned();
        for name in names {
            line.push(' ');
            line.push_str(name);
        }
        Self::Reply(line)
    }

    fn ok() -> Self {
        Self::Reply("OK".to_owned())
    }
}

#[derive(Debug, Clone)]
struct ModelSession {
    id: u64,
    username: Option<&'static str>,
    failed_logins: u32,
}

/// Reference model of every client's session, the identities and the
/// channels.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    next_session_id: u64,
    sessions: Vec<Option<ModelSession>>,
    passwords: HashMap<&'static str, &'static str>,
    live: HashMap<&'static str, ClientId>,
    channels: BTreeMap<&'static str, Vec<ClientId>>,
    inboxes: Vec<Vec<String>>,
}

impl ModelWorld {
    /// Model with `num_clients` clients, none connected.
    pub fn new(num_clients: usize) -> Self {
        Self {
            next_session_id: 1,
            sessions: vec![None; num_clients],
            passwords: HashMap::new(),
            live: HashMap::new(),
            channels: BTreeMap::new(),
            inboxes: vec![Vec::new(); num_clients],
        }
    }

    /// Lines delivered to `client_id` so far.
    pub fn inbox(&self, client_id: ClientId) -> &[String] {
        &self.inboxes[usize::from(client_id)]
    }

    /// Whether the client currently has a connection.
    pub fn is_connected(&self, client_id: ClientId) -> bool {
        self.sessions[usize::from(client_id)].is_some()
    }

    /// Logged-in usernames in connection order.
    pub fn usernames(&self) -> Vec<&'static str> {
        let mut live: Vec<&ModelSession> = self.sessions.iter().flatten().collect();
        live.sort_by_key(|session| session.id);
        live.iter().filter_map(|session| session.username).collect()
    }

    /// Apply one operation and return what the client would observe.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        let client = op.client_id();
        let index = usize::from(client);

        if let Operation::Connect { .. } = op {
            if self.sessions[index].is_none() {
                self.sessions[index] =
                    Some(ModelSession { id: self.next_session_id, username: None, failed_logins: 0 });
                self.next_session_id += 1;
            }
            return OperationResult::Connected;
        }

        let Some(session) = &self.sessions[index] else {
            return OperationResult::NotConnected;
        };
        let sender = session.username;

        match (op, sender) {
            (Operation::Quit { .. }, _) => {
                self.disconnect(client);
                OperationResult::Reply("TIUQ".to_owned())
            }
            (Operation::Login { .. }, Some(_)) => OperationResult::error(&ChatError::AlreadyLoggedIn),
            (Operation::Login { name, password, .. }, None) => {
                self.login(client, pick(&NAMES, *name), pick(&PASSWORDS, *password))
            }
            (_, None) => OperationResult::error(&ChatError::NotAuthorized),
            (Operation::Join { channel, .. }, Some(_)) => {
                let members = self.channels.entry(pick(&CHANNELS, *channel)).or_default();
                if !members.contains(&client) {
                    members.push(client);
                }
                OperationResult::ok()
            }
            (Operation::Part { channel, .. }, Some(_)) => {
                let Some(members) = self.channels.get_mut(pick(&CHANNELS, *channel)) else {
                    return OperationResult::error(&ChatError::ChannelNotFound);
                };
                let Some(position) = members.iter().position(|id| *id == client) else {
                    return OperationResult::error(&ChatError::NotChannelMember);
                };
                members.remove(position);
                OperationResult::ok()
            }
            (Operation::List { channel, .. }, Some(_)) => {
                let Some(members) = self.channels.get(pick(&CHANNELS, *channel)) else {
                    return OperationResult::error(&ChatError::ChannelNotFound);
                };
                let names: Vec<&str> =
                    members.iter().filter_map(|id| self.username_of(*id)).collect();
                OperationResult::listing("LIST", &names)
            }
            (Operation::SayChannel { channel, content, .. }, Some(sender)) => {
                let Some(members) = self.channels.get(pick(&CHANNELS, *channel)) else {
                    return OperationResult::error(&ChatError::ChannelNotFound);
                };
                let line = format!("FROM {sender} {}", chunk(*content));
                for member in members.clone() {
                    self.inboxes[usize::from(member)].push(line.clone());
                }
                OperationResult::ok()
            }
            (Operation::SayUser { name, content, .. }, Some(sender)) => {
                let Some(target) = self.live.get(pick(&NAMES, *name)).copied() else {
                    return OperationResult::error(&ChatError::UserNotFound);
                };
                self.inboxes[usize::from(target)].push(format!("FROM {sender} {}", chunk(*content)));
                OperationResult::ok()
            }
            (Operation::Users { .. }, Some(_)) => OperationResult::listing("USERS", &self.usernames()),
            (Operation::Rooms { .. }, Some(_)) => {
                let names: Vec<&str> = self.channels.keys().copied().collect();
                OperationResult::listing("ROOMS", &names)
            }
            (Operation::Connect { .. }, _) => OperationResult::Connected,
        }
    }

    fn login(&mut self, client: ClientId, name: &'static str, password: &'static str) -> OperationResult {
        if let Some(stored) = self.passwords.get(name).copied() {
            if self.live.contains_key(name) {
                return OperationResult::error(&ChatError::UsernameInUse);
            }
            if stored != password {
                let Some(session) = self.sessions[usize::from(client)].as_mut() else {
                    return OperationResult::NotConnected;
                };
                session.failed_logins += 1;
                if session.failed_logins >= MAX_LOGIN_ATTEMPTS {
                    self.disconnect(client);
                    return OperationResult::error(&ChatError::TooManyLoginAttempts);
                }
                return OperationResult::error(&ChatError::InvalidPassword);
            }
        } else {
            self.passwords.insert(name, password);
        }

        if let Some(session) = self.sessions[usize::from(client)].as_mut() {
            session.username = Some(name);
            session.failed_logins = 0;
        }
        self.live.insert(name, client);
        OperationResult::ok()
    }

    fn username_of(&self, client: ClientId) -> Option<&'static str> {
        self.sessions[usize::from(client)].as_ref().and_then(|session| session.username)
    }

    fn disconnect(&mut self, client: ClientId) {
        for members in self.channels.values_mut() {
            members.retain(|id| *id != client);
        }
        if let Some(name) = self.username_of(client) {
            self.live.remove(name);
        }
        self.sessions[usize::from(client)] = None;
    }
}
