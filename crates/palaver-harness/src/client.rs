//! Line-oriented test clients.
//!
//! Both clients speak the wire protocol directly, one request line at a time,
//! and hand back replies with the line terminator stripped.

use std::{io, net::SocketAddr};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf};
use tracing::trace;
use turmoil::net::{TcpStream, UdpSocket};

use crate::sim_transport::any_addr;

/// Largest datagram a [`DatagramClient`] accepts.
const MAX_DATAGRAM: usize = 2048;

fn resolve(host: &str, port: u16) -> SocketAddr {
    SocketAddr::new(turmoil::lookup(host), port)
}

/// Client over a simulated TCP stream.
pub struct LineClient {
    lines: Lines<BufReader<ReadHalf<TcpStream>>>,
    writer: WriteHalf<TcpStream>,
}

impl LineClient {
    /// Connect to `host:port` inside the simulation.
    pub async fn connect(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect(resolve(host, port)).await?;
        let (read, writer) = tokio::io::split(stream);
        Ok(Self { lines: BufReader::new(read).lines(), writer })
    }

    /// Write one request line.
    pub async fn send(&mut self, line: &str) -> io::Result<()> {
        trace!(line, "client send");
        self.writer.write_all(format!("{line}\n").as_bytes()).await
    }

    /// Read the next line. A closed connection is `UnexpectedEof`.
    pub async fn recv(&mut self) -> io::Result<String> {
        self.lines
            .next_line()
            .await?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"))
    }

    /// Send `line` and read one line back.
    pub async fn request(&mut self, line: &str) -> io::Result<String> {
        self.send(line).await?;
        self.recv().await
    }

    /// Whether the server has closed the stream with nothing left unread.
    pub async fn is_closed(&mut self) -> io::Result<bool> {
        Ok(self.lines.next_line().await?.is_none())
    }
}

/// Client over a simulated UDP socket. Each line is one datagram.
pub struct DatagramClient {
    socket: UdpSocket,
    server: SocketAddr,
}

impl DatagramClient {
    /// Bind `local_port` and address `host:port`.
    pub async fn bind(local_port: u16, host: &str, port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind(any_addr(local_port)).await?;
        Ok(Self { socket, server: resolve(host, port) })
    }

    /// Send one request line.
    pub async fn send(&self, line: &str) -> io::Result<()> {
        trace!(line, "client send");
        self.socket.send_to(format!("{line}\n").as_bytes(), self.server).await.map(|_| ())
    }

    /// Next datagram from the server, as a line.
    pub async fn recv(&self) -> io::Result<String> {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            if from != self.server {
                continue;
            }
            let line = String::from_utf8_lossy(&buf[..len]);
            return Ok(line.trim_end_matches(['\r', '\n']).to_owned());
        }
    }

    /// Send `line` and wait for one datagram back.
    pub async fn request(&self, line: &str) -> io::Result<String> {
        self.send(line).await?;
        self.recv().await
    }
}
