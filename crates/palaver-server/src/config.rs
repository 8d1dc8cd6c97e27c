//! Server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use palaver_core::DispatcherConfig;

use crate::error::ServerError;

/// Default listen port for both transports.
pub const DEFAULT_PORT: u16 = 7070;

/// Runtime settings for [`crate::ChatServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address both listeners bind to.
    pub host: IpAddr,
    /// Port both listeners bind to.
    pub port: u16,
    /// Largest single read from a connection (and largest UDP datagram).
    pub max_read_size: usize,
    /// Capacity of the dispatcher's request mailbox.
    pub mailbox_capacity: usize,
    /// Capacity of the new-connection queue feeding the dispatcher.
    pub intake_capacity: usize,
    /// Datagrams buffered per UDP peer before new ones are dropped.
    pub udp_queue_capacity: usize,
    /// Relayed messages queued per session before new ones are dropped.
    pub outbound_capacity: usize,
    /// Dispatcher tunables.
    pub dispatcher: DispatcherConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_read_size: 1024,
            mailbox_capacity: 10,
            intake_capacity: 10,
            udp_queue_capacity: 10,
            outbound_capacity: 64,
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ServerError> {
        let sizes = [
            ("max_read_size", self.max_read_size),
            ("mailbox_capacity", self.mailbox_capacity),
            ("intake_capacity", self.intake_capacity),
            ("udp_queue_capacity", self.udp_queue_capacity),
            ("outbound_capacity", self.outbound_capacity),
        ];
        if let Some((field, _)) = sizes.iter().find(|(_, value)| *value == 0) {
            return Err(ServerError::Config(format!("{field} must be positive")));
        }
        if self.dispatcher.max_login_attempts == 0 {
            return Err(ServerError::Config("max_login_attempts must be positive".into()));
        }
        Ok(())
    }

    /// Address for both the TCP listener and the UDP socket.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
