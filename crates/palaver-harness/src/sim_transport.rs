//! Turmoil-backed listener and socket.
//!
//! Thin newtypes over `turmoil::net` so the real server runtime can be bound
//! inside a simulated host unchanged.

use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
};

use async_trait::async_trait;
use palaver_server::{PacketSocket, StreamListener};
use turmoil::net::{TcpListener, TcpStream, UdpSocket};

pub(crate) fn any_addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

/// Simulated TCP listener.
pub struct SimListener(TcpListener);

impl SimListener {
    /// Listen on `port` on every address of the current host.
    pub async fn bind(port: u16) -> io::Result<Self> {
        TcpListener::bind(any_addr(port)).await.map(Self)
    }
}

#[async_trait]
impl StreamListener for SimListener {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.0.accept().await
    }
}

/// Simulated UDP socket.
pub struct SimSocket(UdpSocket);

impl SimSocket {
    /// Bind `port` on every address of the current host.
    pub async fn bind(port: u16) -> io::Result<Self> {
        UdpSocket::bind(any_addr(port)).await.map(Self)
    }
}

#[async_trait]
impl PacketSocket for SimSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.0.recv_from(buf).await
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.0.send_to(buf, target).await
    }
}
