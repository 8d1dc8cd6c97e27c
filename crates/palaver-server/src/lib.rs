//! Palaver chat server runtime
//!
//! Tokio runtime around the `palaver-core` dispatcher. TCP streams and
//! virtual UDP connections enter through the same intake queue, each gets a
//! session worker, and the dispatcher loop serializes every request.
//!
//! # Architecture
//!
//! ```text
//! TcpListener ── accept_loop ──────┐
//!                                  ├──> intake ──> DispatchLoop ──> Dispatcher
//! UdpSocket ──── UdpMultiplexer ───┘        │            ▲
//!                                           ▼            │ requests
//!                               SessionWorker + writer ──┘
//! ```
//!
//! # Components
//!
//! - [`transport`]: connection abstraction, listener and socket seams
//! - [`udp`]: virtual connections over one UDP socket
//! - [`dispatch`]: the dispatcher loop
//! - [`config`]: server configuration
//! - [`error`]: server error types

pub mod config;
pub mod dispatch;
pub mod error;
pub mod transport;
pub mod udp;
mod worker;

use std::sync::Arc;

pub use config::ServerConfig;
pub use dispatch::DispatchLoop;
pub use error::ServerError;
use palaver_core::{CredentialHasher, Dispatcher, Environment, Pbkdf2Hasher, SystemEnv};
use tokio::sync::mpsc;
pub use transport::{
    Connection, FrameRead, FrameWrite, PacketSocket, StreamListener, TransportKind, accept_loop,
};
pub use udp::UdpMultiplexer;

/// A configured server, ready to be bound to sockets.
pub struct ChatServer<E, H> {
    config: ServerConfig,
    dispatcher: Dispatcher<E, H>,
}

impl ChatServer<SystemEnv, Pbkdf2Hasher<SystemEnv>> {
    /// Server using the OS RNG and the default credential hasher.
    pub fn with_system(config: ServerConfig) -> Self {
        let dispatcher =
            Dispatcher::new(config.dispatcher.clone(), SystemEnv, Pbkdf2Hasher::new(SystemEnv));
        Self::new(config, dispatcher)
    }
}

impl<E, H> ChatServer<E, H>
where
    E: Environment,
    H: CredentialHasher,
{
    /// Server around an existing dispatcher.
    pub fn new(config: ServerConfig, dispatcher: Dispatcher<E, H>) -> Self {
        Self { config, dispatcher }
    }

    /// Serve both transports until one of them fails.
    pub async fn serve<L, S>(self, listener: L, socket: S) -> Result<(), ServerError>
    where
        L: StreamListener,
        S: PacketSocket,
    {
        self.config.validate()?;

        let (intake_tx, intake_rx) = mpsc::channel(self.config.intake_capacity);
        let dispatch = DispatchLoop::new(
            self.dispatcher,
            intake_rx,
            self.config.mailbox_capacity,
            self.config.outbound_capacity,
        );
        let dispatch_task = tokio::spawn(dispatch.run());

        let tcp = accept_loop(listener, intake_tx.clone(), self.config.max_read_size);
        let udp = UdpMultiplexer::new(
            Arc::new(socket),
            intake_tx,
            self.config.max_read_size,
            self.config.udp_queue_capacity,
        )
        .run();

        let result = tokio::try_join!(tcp, udp).map(|_| ());
        dispatch_task.abort();
        result
    }
}
