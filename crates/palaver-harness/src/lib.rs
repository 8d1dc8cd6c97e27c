//! Deterministic simulation harness for Palaver.
//!
//! Turmoil-backed implementations of the server's listener and socket seams,
//! a seeded [`palaver_core::Environment`], line-oriented test clients, and a
//! reference model of the chat state for model-based testing.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod model;
pub mod sim_env;
pub mod sim_transport;

pub use client::{DatagramClient, LineClient};
pub use model::{ClientId, ModelChannel, ModelWorld, Operation, OperationResult};
pub use sim_env::SimEnv;
pub use sim_transport::{SimListener, SimSocket};
