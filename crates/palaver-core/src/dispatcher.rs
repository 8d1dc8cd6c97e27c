//! Dispatcher state machine.
//!
//! The dispatcher is the single owner of every piece of shared chat state:
//! identities, channels and live sessions. It is Sans-IO. The runtime feeds
//! it [`DispatchEvent`]s one at a time and carries out the
//! [`DispatchAction`]s it returns, so every mutation is linearized without a
//! lock.
//!
//! ```text
//! DispatchEvent::Connected ──┐
//!                            ├──> Dispatcher::process_event() ──> Vec<DispatchAction>
//! DispatchEvent::Request ────┘
//! ```
//!
//! Every `Request` event produces exactly one [`DispatchAction::Reply`] for
//! the originating session, whether the request succeeded or not. Message
//! deliveries and status updates for that request are emitted before the
//! reply.

use std::{
    collections::{BTreeMap, HashMap},
    net::SocketAddr,
};

use bytes::Bytes;
use palaver_proto::{Message, Name, Response, Target};
use tracing::{debug, info, warn};

use crate::{
    credential::{CredentialHash, CredentialHasher},
    env::Environment,
    error::ChatError,
    quip,
    request::Request,
    session::{Session, SessionId, SessionStatus},
};

/// Tunables for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Failed logins on one session before it is disconnected.
    pub max_login_attempts: u32,
    /// Whether sessions occasionally receive a canned quip.
    pub quips: bool,
    /// A quip follows every `quip_interval`-th successful SAY.
    pub quip_interval: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { max_login_attempts: 3, quips: false, quip_interval: 4 }
    }
}

/// Input to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// A new logical connection arrived.
    Connected {
        /// Identifier chosen by the runtime.
        session_id: SessionId,
        /// Remote address.
        peer: SocketAddr,
    },
    /// A session worker submitted a parsed request.
    Request {
        /// Originating session.
        session_id: SessionId,
        /// The request.
        request: Request,
    },
}

/// Output of the dispatcher, executed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchAction {
    /// Answer the session's pending request.
    Reply {
        /// Session that submitted the request.
        session_id: SessionId,
        /// Reply to write.
        response: Response,
    },
    /// Write relayed message lines to a session.
    Deliver {
        /// Recipient session.
        session_id: SessionId,
        /// `\n`-terminated lines, written in order.
        lines: Vec<Bytes>,
    },
    /// A session's authentication status changed.
    StatusChanged {
        /// Affected session.
        session_id: SessionId,
        /// New status.
        status: SessionStatus,
    },
    /// The session is gone from shared state; close it once the reply is out.
    Disconnect {
        /// Session to close.
        session_id: SessionId,
    },
}

#[derive(Debug)]
struct Identity {
    credential: CredentialHash,
    live_session: Option<SessionId>,
}

#[derive(Debug, Default)]
struct Channel {
    members: Vec<SessionId>,
}

/// Single-writer owner of identities, channels and sessions.
pub struct Dispatcher<E, H> {
    config: DispatcherConfig,
    env: E,
    hasher: H,
    identities: HashMap<Name, Identity>,
    channels: BTreeMap<Name, Channel>,
    sessions: BTreeMap<SessionId, Session>,
    actions: Vec<DispatchAction>,
}

impl<E, H> Dispatcher<E, H>
where
    E: Environment,
    H: CredentialHasher,
{
    /// Empty dispatcher.
    pub fn new(config: DispatcherConfig, env: E, hasher: H) -> Self {
        Self {
            config,
            env,
            hasher,
            identities: HashMap::new(),
            channels: BTreeMap::new(),
            sessions: BTreeMap::new(),
            actions: Vec::new(),
        }
    }

    /// Process one event to completion.
    pub fn process_event(&mut self, event: DispatchEvent) -> Vec<DispatchAction> {
        match event {
            DispatchEvent::Connected { session_id, peer } => {
                self.register_connection(session_id, peer);
            }
            DispatchEvent::Request { session_id, request } => {
                self.handle_request(session_id, request);
            }
        }
        std::mem::take(&mut self.actions)
    }

    fn handle_request(&mut self, session_id: SessionId, request: Request) {
        let Some(before) = self.sessions.get(&session_id).map(Session::status) else {
            // Late requests from a session that is already gone
            let response = match request {
                Request::Quit => Response::quit(),
                _ => Response::error(ChatError::UnknownSession),
            };
            self.reply(session_id, response);
            return;
        };

        let verb = request.verb();
        let response = match request.execute(session_id, self) {
            Ok(response) => response,
            Err(err) if err.is_fatal() => {
                warn!(session_id, %verb, error = %err, "fatal request error");
                self.quit(session_id);
                Response::fatal(err)
            }
            Err(err) => {
                debug!(session_id, %verb, kind = ?err.kind(), error = %err, "request failed");
                Response::error(err)
            }
        };

        let after = self.sessions.get(&session_id).map(Session::status);
        if let Some(status) = after.filter(|status| *status != before) {
            self.actions.push(DispatchAction::StatusChanged { session_id, status });
        }

        self.reply(session_id, response);
    }

    fn reply(&mut self, session_id: SessionId, response: Response) {
        let terminal = response.is_terminal();
        self.actions.push(DispatchAction::Reply { session_id, response });
        if terminal {
            self.actions.push(DispatchAction::Disconnect { session_id });
        }
    }

    /// Add a fresh, unauthenticated session.
    pub fn register_connection(&mut self, session_id: SessionId, peer: SocketAddr) {
        info!(session_id, %peer, "session registered");
        self.sessions.insert(session_id, Session::new(session_id, peer));
    }

    /// Register a new identity or log in to an existing one.
    pub fn login(
        &mut self,
        session_id: SessionId,
        username: Name,
        password: &[u8],
    ) -> Result<(), ChatError> {
        let session = self.sessions.get_mut(&session_id).ok_or(ChatError::UnknownSession)?;
        if session.is_authenticated() {
            return Err(ChatError::AlreadyLoggedIn);
        }

        if let Some(identity) = self.identities.get_mut(&username) {
            if identity.live_session.is_some() {
                return Err(ChatError::UsernameInUse);
            }
            if !self.hasher.verify(&identity.credential, password) {
                let attempts = session.fail_login();
                debug!(session_id, %username, attempts, "login rejected");
                if attempts >= self.config.max_login_attempts {
                    return Err(ChatError::TooManyLoginAttempts);
                }
                return Err(ChatError::InvalidPassword);
            }
            identity.live_session = Some(session_id);
        } else {
            let credential = self.hasher.hash(password)?;
            info!(%username, "identity registered");
            self.identities
                .insert(username.clone(), Identity { credential, live_session: Some(session_id) });
        }

        info!(session_id, %username, "logged in");
        session.authenticate(username);
        Ok(())
    }

    /// Add the session to `channel`, creating the channel if needed.
    pub fn join(&mut self, session_id: SessionId, channel: Name) -> Result<(), ChatError> {
        if !self.sessions.contains_key(&session_id) {
            return Err(ChatError::UnknownSession);
        }

        let members = &mut self.channels.entry(channel).or_default().members;
        if !members.contains(&session_id) {
            members.push(session_id);
        }
        Ok(())
    }

    /// Remove the session from `channel`.
    pub fn part(&mut self, session_id: SessionId, channel: &Name) -> Result<(), ChatError> {
        let members = &mut self.channels.get_mut(channel).ok_or(ChatError::ChannelNotFound)?.members;
        let position =
            members.iter().position(|id| *id == session_id).ok_or(ChatError::NotChannelMember)?;
        members.remove(position);
        Ok(())
    }

    /// Usernames of `channel`'s members, in join order.
    pub fn members(&self, channel: &Name) -> Result<Vec<Name>, ChatError> {
        let channel = self.channels.get(channel).ok_or(ChatError::ChannelNotFound)?;
        Ok(channel
            .members
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .filter_map(|session| session.username().cloned())
            .collect())
    }

    /// Usernames of every logged-in session, in connection order.
    pub fn usernames(&self) -> Vec<Name> {
        self.sessions
            .values()
            .filter(|session| session.is_authenticated())
            .filter_map(|session| session.username().cloned())
            .collect()
    }

    /// Every channel ever created, sorted by name.
    pub fn channel_names(&self) -> Vec<Name> {
        self.channels.keys().cloned().collect()
    }

    /// Send `message` on behalf of the session.
    pub fn say(&mut self, session_id: SessionId, message: &Message) -> Result<(), ChatError> {
        let session = self.sessions.get(&session_id).ok_or(ChatError::UnknownSession)?;
        let sender = session
            .username()
            .filter(|_| session.is_authenticated())
            .cloned()
            .ok_or(ChatError::NotAuthorized)?;

        self.say_to(&sender, message)?;

        let previous = match self.sessions.get_mut(&session_id) {
            Some(session) => session.record_message(),
            None => return Ok(()),
        };
        let interval = self.config.quip_interval;
        if self.config.quips && interval > 0 && previous % interval == interval - 1 {
            self.send_quip(session_id);
        }
        Ok(())
    }

    /// Deliver `message` from `sender` to its target.
    ///
    /// Recipients are resolved before anything is queued, so a failed lookup
    /// delivers nothing.
    pub fn say_to(&mut self, sender: &Name, message: &Message) -> Result<(), ChatError> {
        let recipients = match message.target() {
            Target::Channel(name) => self
                .channels
                .get(name.as_str())
                .ok_or(ChatError::ChannelNotFound)?
                .members
                .clone(),
            Target::User(name) => vec![
                self.identities
                    .get(name.as_str())
                    .and_then(|identity| identity.live_session)
                    .ok_or(ChatError::UserNotFound)?,
            ],
        };

        let lines = message.relay(sender.as_str());
        debug!(%sender, target = ?message.target(), recipients = recipients.len(), "relaying message");
        for session_id in recipients {
            self.actions.push(DispatchAction::Deliver { session_id, lines: lines.clone() });
        }
        Ok(())
    }

    fn send_quip(&mut self, session_id: SessionId) {
        let Some(target) = self.sessions.get(&session_id).and_then(Session::username).cloned()
        else {
            return;
        };

        let candidates = self.usernames();
        let Some(from) = candidates.get(self.env.random_index(candidates.len())) else {
            return;
        };

        let quip = quip::pick(&self.env);
        let message = Message::from_payload(Target::User(target.to_string()), quip.as_bytes());
        if let Err(err) = self.say_to(from, &message) {
            debug!(session_id, error = %err, "quip dropped");
        }
    }

    /// Remove the session from every channel and from the session set, and
    /// release its username. Unknown sessions are ignored.
    pub fn quit(&mut self, session_id: SessionId) {
        for channel in self.channels.values_mut() {
            channel.members.retain(|id| *id != session_id);
        }

        let Some(session) = self.sessions.remove(&session_id) else {
            return;
        };

        if let Some(identity) = session.username().and_then(|name| self.identities.get_mut(name)) {
            if identity.live_session == Some(session_id) {
                identity.live_session = None;
            }
        }

        info!(session_id, session = %session.status().label(session.peer()), "session closed");
    }

    /// Look up a live session.
    pub fn session(&self, session_id: SessionId) -> Option<&Session> {
        self.sessions.get(&session_id)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether an identity exists for `username`, logged in or not.
    pub fn is_registered(&self, username: &str) -> bool {
        self.identities.contains_key(username)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;
    use crate::{credential::Pbkdf2Hasher, env::SystemEnv};

    type TestDispatcher = Dispatcher<SystemEnv, Pbkdf2Hasher<SystemEnv>>;

    fn dispatcher() -> TestDispatcher {
        Dispatcher::new(
            DispatcherConfig::default(),
            SystemEnv,
            Pbkdf2Hasher::with_iterations(SystemEnv, 16),
        )
    }

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn name(raw: &str) -> Name {
        Name::parse(raw).unwrap()
    }

    fn logged_in(dispatcher: &mut TestDispatcher, id: SessionId, username: &str) {
        dispatcher.register_connection(id, peer(4000 + id as u16));
        dispatcher.login(id, name(username), b"secret1").unwrap();
    }

    #[test]
    fn first_login_registers_identity() {
        let mut dispatcher = dispatcher();
        logged_in(&mut dispatcher, 1, "alice");

        assert!(dispatcher.is_registered("alice"));
        assert!(dispatcher.session(1).unwrap().is_authenticated());
        assert_eq!(dispatcher.usernames(), vec![name("alice")]);
    }

    #[test]
    fn live_username_cannot_be_claimed_twice() {
        let mut dispatcher = dispatcher();
        logged_in(&mut dispatcher, 1, "alice");
        dispatcher.register_connection(2, peer(4002));

        assert_eq!(
            dispatcher.login(2, name("alice"), b"secret1"),
            Err(ChatError::UsernameInUse)
        );
        assert_eq!(dispatcher.session(2).unwrap().login_attempts(), 0);
    }

    #[test]
    fn relogin_after_quit_checks_password() {
        let mut dispatcher = dispatcher();
        logged_in(&mut dispatcher, 1, "alice");
        dispatcher.quit(1);

        dispatcher.register_connection(2, peer(4002));
        assert_eq!(dispatcher.login(2, name("alice"), b"nope123"), Err(ChatError::InvalidPassword));
        assert_eq!(dispatcher.login(2, name("alice"), b"secret1"), Ok(()));
        assert_eq!(dispatcher.session(2).unwrap().login_attempts(), 0);
    }

    #[test]
    fn join_is_idempotent() {
        let mut dispatcher = dispatcher();
        logged_in(&mut dispatcher, 1, "alice");

        dispatcher.join(1, name("lobby")).unwrap();
        dispatcher.join(1, name("lobby")).unwrap();
        assert_eq!(dispatcher.members(&name("lobby")).unwrap(), vec![name("alice")]);
    }

    #[test]
    fn part_errors_leave_state_alone() {
        let mut dispatcher = dispatcher();
        logged_in(&mut dispatcher, 1, "alice");
        logged_in(&mut dispatcher, 2, "bob");

        assert_eq!(dispatcher.part(1, &name("lobby")), Err(ChatError::ChannelNotFound));

        dispatcher.join(2, name("lobby")).unwrap();
        assert_eq!(dispatcher.part(1, &name("lobby")), Err(ChatError::NotChannelMember));
        assert_eq!(dispatcher.members(&name("lobby")).unwrap(), vec![name("bob")]);
    }

    #[test]
    fn empty_channels_are_kept() {
        let mut dispatcher = dispatcher();
        logged_in(&mut dispatcher, 1, "alice");
        dispatcher.join(1, name("lobby")).unwrap();
        dispatcher.part(1, &name("lobby")).unwrap();

        assert_eq!(dispatcher.channel_names(), vec![name("lobby")]);
        assert_eq!(dispatcher.members(&name("lobby")).unwrap(), Vec::<Name>::new());
    }

    #[test]
    fn unknown_targets_deliver_nothing() {
        let mut dispatcher = dispatcher();
        logged_in(&mut dispatcher, 1, "alice");

        let (to_user, _) = Message::begin(b"carol 2 hi").unwrap();
        assert_eq!(dispatcher.say(1, &to_user), Err(ChatError::UserNotFound));

        let (to_channel, _) = Message::begin(b"@nowhere 2 hi").unwrap();
        assert_eq!(dispatcher.say(1, &to_channel), Err(ChatError::ChannelNotFound));

        assert!(dispatcher.actions.is_empty());
        assert_eq!(dispatcher.session(1).unwrap().messages_sent(), 0);
    }

    #[test]
    fn quit_releases_everything() {
        let mut dispatcher = dispatcher();
        logged_in(&mut dispatcher, 1, "alice");
        dispatcher.join(1, name("lobby")).unwrap();
        dispatcher.join(1, name("games")).unwrap();

        dispatcher.quit(1);
        dispatcher.quit(1);

        assert_eq!(dispatcher.session_count(), 0);
        assert!(dispatcher.usernames().is_empty());
        assert!(dispatcher.members(&name("lobby")).unwrap().is_empty());
        assert!(dispatcher.members(&name("games")).unwrap().is_empty());
        assert!(dispatcher.is_registered("alice"));
    }

    const CHANNELS: [&str; 3] = ["lobby", "rust", "ops"];
    const USERS: [&str; 3] = ["alice", "bob", "carol"];

    #[derive(Debug, Clone)]
    enum MembershipOp {
        Join(SessionId, usize),
        Part(SessionId, usize),
        Quit(SessionId),
    }

    fn membership_op() -> impl Strategy<Value = MembershipOp> {
        prop_oneof![
            3 => (1..4u64, 0..3usize).prop_map(|(id, channel)| MembershipOp::Join(id, channel)),
            2 => (1..4u64, 0..3usize).prop_map(|(id, channel)| MembershipOp::Part(id, channel)),
            1 => (1..4u64).prop_map(MembershipOp::Quit),
        ]
    }

    proptest! {
        #[test]
        fn membership_matches_a_set_model(ops in prop::collection::vec(membership_op(), 0..40)) {
            let mut dispatcher = dispatcher();
            for (id, user) in (1..).zip(USERS) {
                logged_in(&mut dispatcher, id, user);
            }

            let mut model: Vec<Option<Vec<SessionId>>> = vec![None; CHANNELS.len()];
            let mut live: BTreeSet<SessionId> = (1..4).collect();

            for op in ops {
                match op {
                    MembershipOp::Join(id, channel) => {
                        let result = dispatcher.join(id, name(CHANNELS[channel]));
                        if live.contains(&id) {
                            prop_assert_eq!(result, Ok(()));
                            let members = model[channel].get_or_insert_with(Vec::new);
                            if !members.contains(&id) {
                                members.push(id);
                            }
                        } else {
                            prop_assert_eq!(result, Err(ChatError::UnknownSession));
                        }
                    }
                    MembershipOp::Part(id, channel) => {
                        let result = dispatcher.part(id, &name(CHANNELS[channel]));
                        match model[channel].as_mut() {
                            None => {
                                prop_assert_eq!(result, Err(ChatError::ChannelNotFound));
                            }
                            Some(members) => match members.iter().position(|m| *m == id) {
                                Some(position) => {
                                    prop_assert_eq!(result, Ok(()));
                                    members.remove(position);
                                }
                                None => {
                                    prop_assert_eq!(result, Err(ChatError::NotChannelMember));
                                }
                            },
                        }
                    }
                    MembershipOp::Quit(id) => {
                        dispatcher.quit(id);
                        live.remove(&id);
                        for members in model.iter_mut().flatten() {
                            members.retain(|m| *m != id);
                        }
                    }
                }

                for (channel, expected) in CHANNELS.iter().zip(&model) {
                    let actual = dispatcher.members(&name(channel));
                    match expected {
                        None => {
                            prop_assert_eq!(actual, Err(ChatError::ChannelNotFound));
                        }
                        Some(ids) => {
                            let names: Vec<Name> =
                                ids.iter().map(|id| name(USERS[(*id - 1) as usize])).collect();
                            prop_assert_eq!(actual, Ok(names));
                        }
                    }
                }
            }
        }
    }
}
