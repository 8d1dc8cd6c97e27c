//! Palaver chat core logic
//!
//! Pure state machine logic for the palaver chat server, decoupled from
//! sockets and tasks.
//!
//! # Architecture
//!
//! The [`Dispatcher`] owns every piece of shared state: registered
//! identities, channel membership and live sessions. It consumes
//! [`DispatchEvent`]s one at a time and returns [`DispatchAction`]s that a
//! runtime carries out (writing replies, relaying messages, closing
//! connections). Nothing else mutates that state, so the runtime needs no
//! locks around it.
//!
//! Randomness (credential salts, quip selection) is supplied through the
//! [`Environment`] trait, so the same code runs under the OS RNG in
//! production and under a seeded RNG in tests and simulations.
//!
//! # Components
//!
//! - [`dispatcher`]: the dispatcher state machine
//! - [`request`]: request variants and their authorize/parse/execute steps
//! - [`session`]: per-connection session state
//! - [`credential`]: password hashing and verification
//! - [`mod@env`]: environment abstraction (RNG)
//! - [`quip`]: canned quips
//! - [`error`]: chat error types

pub mod credential;
pub mod dispatcher;
pub mod env;
pub mod error;
pub mod quip;
pub mod request;
pub mod session;

pub use credential::{CredentialHash, CredentialHasher, Pbkdf2Hasher};
pub use dispatcher::{DispatchAction, DispatchEvent, Dispatcher, DispatcherConfig};
pub use env::{Environment, SystemEnv};
pub use error::{ChatError, ErrorKind};
pub use request::{Credentials, Draft, Request, authorize};
pub use session::{Session, SessionId, SessionStatus};
