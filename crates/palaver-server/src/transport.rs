//! Connection abstraction.
//!
//! Session workers see a [`Connection`]: a framed reader and a writer, with
//! no trace of whether a TCP stream or a virtual UDP connection sits
//! underneath. The traits here are also the seams where the simulation
//! harness plugs in its turmoil sockets.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf},
    net::{TcpListener, TcpStream, UdpSocket},
    sync::mpsc,
};
use tracing::{info, warn};

use crate::error::ServerError;

/// Which physical transport a connection rides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// A TCP stream.
    Tcp,
    /// A virtual connection over the shared UDP socket.
    Udp,
}

/// Source of inbound frames.
#[async_trait]
pub trait FrameRead: Send + 'static {
    /// Next frame, or `None` once the peer is gone.
    async fn read_frame(&mut self) -> io::Result<Option<Bytes>>;
}

/// Sink for outbound frames.
#[async_trait]
pub trait FrameWrite: Send + 'static {
    /// Write one frame in full.
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Close the connection. Later writes are not expected.
    async fn close(&mut self) -> io::Result<()>;
}

/// A logical client connection.
pub struct Connection {
    /// Remote address.
    pub peer: SocketAddr,
    /// Underlying transport.
    pub kind: TransportKind,
    /// Inbound half.
    pub reader: Box<dyn FrameRead>,
    /// Outbound half.
    pub writer: Box<dyn FrameWrite>,
}

impl Connection {
    /// Wrap a byte stream, framing reads at line boundaries.
    pub fn from_stream<S>(stream: S, peer: SocketAddr, max_frame: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        Self {
            peer,
            kind: TransportKind::Tcp,
            reader: Box::new(StreamReader::new(read, max_frame)),
            writer: Box::new(StreamWriter { inner: write }),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("peer", &self.peer).field("kind", &self.kind).finish()
    }
}

/// Line framing over a byte stream.
///
/// A frame is everything up to and including the next `\n`, as long as that
/// newline falls within the first `max_frame` buffered bytes. Otherwise the
/// frame is the first `max_frame` bytes. At end of stream any remainder is
/// returned as a last frame.
pub struct StreamReader<R> {
    inner: R,
    buffer: BytesMut,
    max_frame: usize,
    eof: bool,
}

impl<R> StreamReader<R> {
    /// Reader that never yields frames longer than `max_frame` bytes.
    pub fn new(inner: R, max_frame: usize) -> Self {
        let max_frame = max_frame.max(1);
        Self { inner, buffer: BytesMut::with_capacity(max_frame), max_frame, eof: false }
    }

    fn next_buffered(&mut self) -> Option<Bytes> {
        let window = self.buffer.len().min(self.max_frame);
        if let Some(pos) = self.buffer[..window].iter().position(|b| *b == b'\n') {
            return Some(self.buffer.split_to(pos + 1).freeze());
        }
        if self.buffer.len() >= self.max_frame {
            return Some(self.buffer.split_to(self.max_frame).freeze());
        }
        if self.eof && !self.buffer.is_empty() {
            return Some(self.buffer.split().freeze());
        }
        None
    }
}

#[async_trait]
impl<R> FrameRead for StreamReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn read_frame(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.next_buffered() {
                return Ok(Some(frame));
            }
            if self.eof {
                return Ok(None);
            }

            self.buffer.reserve(self.max_frame);
            if self.inner.read_buf(&mut self.buffer).await? == 0 {
                self.eof = true;
            }
        }
    }
}

struct StreamWriter<S> {
    inner: WriteHalf<S>,
}

#[async_trait]
impl<S> FrameWrite for StreamWriter<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.inner.write_all(frame).await?;
        self.inner.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

/// Accepts byte-stream connections.
#[async_trait]
pub trait StreamListener: Send + Sync + 'static {
    /// Accepted stream type.
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    /// Wait for the next connection.
    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)>;
}

#[async_trait]
impl StreamListener for TcpListener {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// A connectionless datagram socket.
#[async_trait]
pub trait PacketSocket: Send + Sync + 'static {
    /// Receive one datagram into `buf`.
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Send one datagram to `target`.
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;
}

#[async_trait]
impl PacketSocket for UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }
}

/// Accept stream connections forever, handing each to the dispatcher.
///
/// Accept failures are logged and skipped. Returns only when the dispatcher
/// stops taking connections.
pub async fn accept_loop<L>(
    listener: L,
    intake: mpsc::Sender<Connection>,
    max_frame: usize,
) -> Result<(), ServerError>
where
    L: StreamListener,
{
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(error = %err, "accept failed");
                continue;
            }
        };

        info!(%peer, "tcp connection accepted");
        if intake.send(Connection::from_stream(stream, peer, max_frame)).await.is_err() {
            return Err(ServerError::DispatcherGone);
        }
    }
}
