//! Virtual connections over a shared UDP socket.
//!
//! [`UdpMultiplexer`] owns the physical socket's receive side and keeps one
//! table entry per peer address. The first datagram from an unknown peer
//! opens a virtual [`Connection`] and hands it to the dispatcher exactly like
//! an accepted TCP stream; later datagrams are queued to that connection.
//!
//! ```text
//! recv_from ──> peers[addr] ──> VirtualReader ──> session worker
//!                                                       │
//! send_to   <──────────────── VirtualWriter <───────────┘
//! ```
//!
//! Closing a virtual connection posts its address and id back to the
//! multiplexer, which drops the matching table entry before handling the next
//! datagram. A close never removes an entry opened after it. A peer
//! that sends while its close is in flight may land in the old session or
//! a new one; datagrams carry no ordering promise, so neither is wrong.

use std::{collections::HashMap, io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::{
    error::ServerError,
    transport::{Connection, FrameRead, FrameWrite, PacketSocket, TransportKind},
};

/// Demultiplexes one datagram socket into per-peer connections.
pub struct UdpMultiplexer<S> {
    socket: Arc<S>,
    intake: mpsc::Sender<Connection>,
    peers: HashMap<SocketAddr, Peer>,
    next_virtual_id: u64,
    closes_tx: mpsc::UnboundedSender<(SocketAddr, u64)>,
    closes_rx: mpsc::UnboundedReceiver<(SocketAddr, u64)>,
    max_datagram: usize,
    queue_capacity: usize,
}

impl<S: PacketSocket> UdpMultiplexer<S> {
    /// Multiplexer feeding new virtual connections into `intake`.
    pub fn new(
        socket: Arc<S>,
        intake: mpsc::Sender<Connection>,
        max_datagram: usize,
        queue_capacity: usize,
    ) -> Self {
        let (closes_tx, closes_rx) = mpsc::unbounded_channel();
        Self {
            socket,
            intake,
            peers: HashMap::new(),
            next_virtual_id: 0,
            closes_tx,
            closes_rx,
            max_datagram: max_datagram.max(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Receive datagrams until the socket fails or the dispatcher stops.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let mut buf = vec![0u8; self.max_datagram];
        loop {
            self.flush_closes();
            let (len, peer) = self.socket.recv_from(&mut buf).await?;
            self.on_datagram(peer, Bytes::copy_from_slice(&buf[..len])).await?;
        }
    }

    /// Number of peers with a table entry.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn flush_closes(&mut self) {
        while let Ok((peer, id)) = self.closes_rx.try_recv() {
            if self.peers.get(&peer).is_some_and(|entry| entry.id == id) {
                self.peers.remove(&peer);
                debug!(%peer, id, "udp peer removed");
            }
        }
    }

    /// Route one datagram, opening a virtual connection if needed.
    pub async fn on_datagram(
        &mut self,
        peer: SocketAddr,
        datagram: Bytes,
    ) -> Result<(), ServerError> {
        if datagram.is_empty() {
            debug!(%peer, "empty datagram dropped");
            return Ok(());
        }

        let datagram = match self.peers.get(&peer) {
            None => datagram,
            Some(entry) => match entry.inbound.try_send(datagram) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(_)) => {
                    warn!(%peer, "udp inbound queue full, datagram dropped");
                    return Ok(());
                }
                Err(TrySendError::Closed(datagram)) => {
                    // Worker is gone but its close has not been seen yet
                    self.peers.remove(&peer);
                    datagram
                }
            },
        };

        self.open(peer, datagram).await
    }

    async fn open(&mut self, peer: SocketAddr, datagram: Bytes) -> Result<(), ServerError> {
        let id = self.next_virtual_id;
        self.next_virtual_id += 1;

        let (inbound_tx, inbound_rx) = mpsc::channel(self.queue_capacity);
        if inbound_tx.try_send(datagram).is_err() {
            warn!(%peer, "udp first datagram dropped");
        }
        self.peers.insert(peer, Peer { id, inbound: inbound_tx });

        let connection = Connection {
            peer,
            kind: TransportKind::Udp,
            reader: Box::new(VirtualReader { inbound: inbound_rx }),
            writer: Box::new(VirtualWriter {
                socket: Arc::clone(&self.socket),
                peer,
                id,
                closes: Some(self.closes_tx.clone()),
            }),
        };

        info!(%peer, id, "udp session opened");
        self.intake.send(connection).await.map_err(|_| ServerError::DispatcherGone)
    }
}

/// Table entry for one peer address.
struct Peer {
    id: u64,
    inbound: mpsc::Sender<Bytes>,
}

/// Inbound side of a virtual connection: one frame per datagram.
struct VirtualReader {
    inbound: mpsc::Receiver<Bytes>,
}

#[async_trait]
impl FrameRead for VirtualReader {
    async fn read_frame(&mut self) -> io::Result<Option<Bytes>> {
        Ok(self.inbound.recv().await)
    }
}

/// Outbound side of a virtual connection: one datagram per frame.
struct VirtualWriter<S> {
    socket: Arc<S>,
    peer: SocketAddr,
    id: u64,
    closes: Option<mpsc::UnboundedSender<(SocketAddr, u64)>>,
}

#[async_trait]
impl<S: PacketSocket> FrameWrite for VirtualWriter<S> {
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.socket.send_to(frame, self.peer).await.map(|_| ())
    }

    async fn close(&mut self) -> io::Result<()> {
        if let Some(closes) = self.closes.take() {
            // The multiplexer may already be gone, which is fine
            closes.send((self.peer, self.id)).ok();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSocket {
        sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    }

    #[async_trait]
    impl PacketSocket for RecordingSocket {
        async fn recv_from(&self, _buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            std::future::pending().await
        }

        async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
            self.sent.lock().unwrap().push((buf.to_vec(), target));
            Ok(buf.len())
        }
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 0, 2, 1], port))
    }

    fn multiplexer(
        queue_capacity: usize,
    ) -> (UdpMultiplexer<RecordingSocket>, Arc<RecordingSocket>, mpsc::Receiver<Connection>) {
        let socket = Arc::new(RecordingSocket::default());
        let (intake_tx, intake_rx) = mpsc::channel(8);
        (UdpMultiplexer::new(Arc::clone(&socket), intake_tx, 1024, queue_capacity), socket, intake_rx)
    }

    #[tokio::test]
    async fn first_datagram_opens_a_connection() {
        let (mut mux, _socket, mut intake) = multiplexer(4);

        mux.on_datagram(addr(1), Bytes::from_static(b"CHAT\n")).await.unwrap();
        mux.on_datagram(addr(1), Bytes::from_static(b"QUIT\n")).await.unwrap();
        mux.on_datagram(addr(2), Bytes::from_static(b"CHAT\n")).await.unwrap();

        let mut first = intake.recv().await.unwrap();
        assert_eq!(first.peer, addr(1));
        assert_eq!(first.kind, TransportKind::Udp);
        assert_eq!(first.reader.read_frame().await.unwrap().unwrap(), "CHAT\n");
        assert_eq!(first.reader.read_frame().await.unwrap().unwrap(), "QUIT\n");

        let second = intake.recv().await.unwrap();
        assert_eq!(second.peer, addr(2));
        assert_eq!(mux.peer_count(), 2);
        assert!(intake.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_datagrams_are_dropped() {
        let (mut mux, socket, mut intake) = multiplexer(4);
        mux.on_datagram(addr(1), Bytes::new()).await.unwrap();
        assert_eq!(mux.peer_count(), 0);
        assert!(intake.try_recv().is_err());

        mux.on_datagram(addr(1), Bytes::from_static(b"CHAT\n")).await.unwrap();
        mux.on_datagram(addr(1), Bytes::new()).await.unwrap();
        mux.on_datagram(addr(1), Bytes::from_static(b"USERS\n")).await.unwrap();

        let mut connection = intake.recv().await.unwrap();
        assert_eq!(connection.reader.read_frame().await.unwrap().unwrap(), "CHAT\n");
        assert_eq!(connection.reader.read_frame().await.unwrap().unwrap(), "USERS\n");
        assert!(socket.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn writes_go_to_the_peer() {
        let (mut mux, socket, mut intake) = multiplexer(4);
        mux.on_datagram(addr(9), Bytes::from_static(b"CHAT\n")).await.unwrap();

        let mut connection = intake.recv().await.unwrap();
        connection.writer.write_frame(b"TAHC\n").await.unwrap();

        assert_eq!(socket.sent.lock().unwrap().as_slice(), &[(b"TAHC\n".to_vec(), addr(9))]);
    }

    #[tokio::test]
    async fn close_makes_the_next_datagram_a_new_session() {
        let (mut mux, _socket, mut intake) = multiplexer(4);
        mux.on_datagram(addr(1), Bytes::from_static(b"QUIT\n")).await.unwrap();

        let mut connection = intake.recv().await.unwrap();
        connection.writer.close().await.unwrap();
        mux.flush_closes();
        assert_eq!(mux.peer_count(), 0);

        mux.on_datagram(addr(1), Bytes::from_static(b"CHAT\n")).await.unwrap();
        let mut fresh = intake.recv().await.unwrap();
        assert_eq!(fresh.reader.read_frame().await.unwrap().unwrap(), "CHAT\n");
    }

    #[tokio::test]
    async fn dead_entry_is_replaced() {
        let (mut mux, _socket, mut intake) = multiplexer(4);
        mux.on_datagram(addr(1), Bytes::from_static(b"CHAT\n")).await.unwrap();
        drop(intake.recv().await.unwrap());

        mux.on_datagram(addr(1), Bytes::from_static(b"USERS\n")).await.unwrap();
        let mut fresh = intake.recv().await.unwrap();
        assert_eq!(fresh.reader.read_frame().await.unwrap().unwrap(), "USERS\n");
        assert_eq!(mux.peer_count(), 1);
    }

    #[tokio::test]
    async fn stale_close_keeps_the_new_entry() {
        let (mut mux, _socket, mut intake) = multiplexer(4);
        mux.on_datagram(addr(1), Bytes::from_static(b"QUIT\n")).await.unwrap();
        let Connection { reader, mut writer, .. } = intake.recv().await.unwrap();
        drop(reader);

        // Reopened before the old close is flushed
        mux.on_datagram(addr(1), Bytes::from_static(b"CHAT\n")).await.unwrap();
        writer.close().await.unwrap();
        mux.flush_closes();
        assert_eq!(mux.peer_count(), 1);

        mux.on_datagram(addr(1), Bytes::from_static(b"USERS\n")).await.unwrap();
        let mut fresh = intake.recv().await.unwrap();
        assert_eq!(fresh.reader.read_frame().await.unwrap().unwrap(), "CHAT\n");
        assert_eq!(fresh.reader.read_frame().await.unwrap().unwrap(), "USERS\n");
    }

    #[tokio::test]
    async fn full_queue_drops_datagrams() {
        let (mut mux, _socket, mut intake) = multiplexer(1);
        mux.on_datagram(addr(1), Bytes::from_static(b"one\n")).await.unwrap();
        mux.on_datagram(addr(1), Bytes::from_static(b"two\n")).await.unwrap();

        let mut connection = intake.recv().await.unwrap();
        assert_eq!(connection.reader.read_frame().await.unwrap().unwrap(), "one\n");

        mux.on_datagram(addr(1), Bytes::from_static(b"three\n")).await.unwrap();
        assert_eq!(connection.reader.read_frame().await.unwrap().unwrap(), "three\n");
    }
}
