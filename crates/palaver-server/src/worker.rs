//! Session workers.
//!
//! Each connection gets two tasks. The [`SessionWorker`] owns the read side:
//! it frames and parses requests, reads any extra chunk lines a SAY needs,
//! submits the finished request to the dispatcher and waits for the reply.
//! The writer task owns the write side and serializes everything the
//! session receives, replies and relayed messages alike.
//!
//! The worker never touches shared state. Its view of the session (logged
//! in or not, under which name) is whatever the dispatcher last published on
//! the status channel.

use std::net::SocketAddr;

use bytes::Bytes;
use palaver_core::{
    ChatError, DispatchEvent, Draft, Request, SessionId, SessionStatus, authorize,
};
use palaver_proto::{Response, Verb, split_request_line, trim_line_end};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::transport::{FrameRead, FrameWrite, TransportKind};

/// Work queued for a session's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outbound {
    /// One encoded reply.
    Frame(Bytes),
    /// Relayed message lines, written in order.
    Lines(Vec<Bytes>),
    /// Close the connection after everything queued before it.
    Close,
}

/// Drain `outbound` into `writer` until told to close.
pub(crate) async fn run_writer(
    mut writer: Box<dyn FrameWrite>,
    mut outbound: mpsc::Receiver<Outbound>,
    status: watch::Receiver<SessionStatus>,
    peer: SocketAddr,
) {
    'outer: while let Some(item) = outbound.recv().await {
        let frames = match item {
            Outbound::Frame(frame) => vec![frame],
            Outbound::Lines(lines) => lines,
            Outbound::Close => break,
        };

        for frame in frames {
            debug!(
                session = %status.borrow().label(peer),
                "SENT {}",
                String::from_utf8_lossy(trim_line_end(&frame))
            );
            if let Err(err) = writer.write_frame(&frame).await {
                warn!(session = %status.borrow().label(peer), error = %err, "write failed");
                break 'outer;
            }
        }
    }

    if let Err(err) = writer.close().await {
        debug!(%peer, error = %err, "close failed");
    }
}

/// What the read loop does after a request.
enum Step {
    /// Keep reading.
    Continue,
    /// A terminal reply was queued, or the dispatcher is gone.
    Finished,
    /// The connection failed or ended.
    Disconnected,
}

/// Read side of one session.
pub(crate) struct SessionWorker {
    pub(crate) session_id: SessionId,
    pub(crate) peer: SocketAddr,
    pub(crate) kind: TransportKind,
    pub(crate) reader: Box<dyn FrameRead>,
    pub(crate) requests: mpsc::Sender<DispatchEvent>,
    pub(crate) replies: mpsc::Receiver<Response>,
    pub(crate) outbound: mpsc::Sender<Outbound>,
    pub(crate) status: watch::Receiver<SessionStatus>,
}

impl SessionWorker {
    /// Serve requests until the session ends.
    pub(crate) async fn run(mut self) {
        info!(
            session_id = self.session_id,
            peer = %self.peer,
            transport = ?self.kind,
            "session started"
        );

        loop {
            let step = match self.read().await {
                Some(frame) => self.handle_frame(&frame).await,
                None => Step::Disconnected,
            };
            match step {
                Step::Continue => {}
                Step::Finished => break,
                Step::Disconnected => {
                    self.quit_silently().await;
                    break;
                }
            }
        }

        self.send(Outbound::Close).await;
        info!(session_id = self.session_id, peer = %self.peer, "session ended");
    }

    async fn read(&mut self) -> Option<Bytes> {
        match self.reader.read_frame().await {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => {
                debug!(session = %self.status.borrow().label(self.peer), "peer closed connection");
                None
            }
            Err(err) => {
                warn!(session = %self.status.borrow().label(self.peer), error = %err, "read failed");
                None
            }
        }
    }

    async fn handle_frame(&mut self, frame: &[u8]) -> Step {
        let line = trim_line_end(frame);
        debug!(
            session = %self.status.borrow().label(self.peer),
            "RCVD {}",
            String::from_utf8_lossy(line)
        );

        let (verb, data) = split_request_line(line);
        let request = match self.prepare(verb, data).await {
            Ok(Some(request)) => request,
            Ok(None) => return Step::Disconnected,
            Err(err) => {
                debug!(
                    session = %self.status.borrow().label(self.peer),
                    kind = ?err.kind(),
                    error = %err,
                    "request rejected"
                );
                self.send(Outbound::Frame(Response::error(err).encode())).await;
                return Step::Continue;
            }
        };

        match self.submit(request).await {
            Some(response) => {
                let terminal = response.is_terminal();
                self.send(Outbound::Frame(response.encode())).await;
                if terminal {
                    Step::Finished
                } else {
                    Step::Continue
                }
            }
            None => {
                warn!(session_id = self.session_id, "dispatcher gone");
                Step::Finished
            }
        }
    }

    /// Authorize and parse one request line, reading chunk lines as needed.
    ///
    /// `Ok(None)` means the connection ended in the middle of a message.
    async fn prepare(&mut self, verb: &[u8], data: &[u8]) -> Result<Option<Request>, ChatError> {
        let verb = Verb::parse(verb)?;
        let status = self.status.borrow().clone();
        authorize(verb, &status)?;

        match Request::parse(verb, data, &status)? {
            Draft::Ready(request) => Ok(Some(request)),
            Draft::Incomplete(mut message) => {
                while !message.is_complete() {
                    let Some(frame) = self.read().await else {
                        return Ok(None);
                    };
                    let line = trim_line_end(&frame);
                    debug!(
                        session = %status.label(self.peer),
                        "RCVD {}",
                        String::from_utf8_lossy(line)
                    );
                    message.push_chunk(line)?;
                }
                Ok(Some(Request::Say(message)))
            }
        }
    }

    /// Hand a request to the dispatcher and wait for its reply.
    async fn submit(&mut self, request: Request) -> Option<Response> {
        let event = DispatchEvent::Request { session_id: self.session_id, request };
        self.requests.send(event).await.ok()?;
        self.replies.recv().await
    }

    /// Clean up through the dispatcher. No reply is written; the peer is
    /// already gone.
    async fn quit_silently(&mut self) {
        if self.submit(Request::Quit).await.is_none() {
            debug!(session_id = self.session_id, "dispatcher gone during shutdown");
        }
    }

    /// Queue a frame for the writer, waiting for room if relays filled it.
    async fn send(&mut self, item: Outbound) {
        // The writer only stops early after a write failure
        self.outbound.send(item).await.ok();
    }
}
