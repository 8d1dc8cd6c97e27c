//! Dispatcher loop.
//!
//! Runs the [`Dispatcher`] state machine on one task and executes the
//! actions it emits. The loop selects between two inputs, newly arrived
//! connections and the bounded request mailbox, and handles each event to
//! completion before taking the next.

use std::collections::HashMap;

use palaver_core::{
    CredentialHasher, DispatchAction, DispatchEvent, Dispatcher, Environment, SessionId,
    SessionStatus,
};
use palaver_proto::Response;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
    transport::Connection,
    worker::{Outbound, SessionWorker, run_writer},
};

/// Channels the loop keeps for each live session.
struct SessionHandle {
    replies: mpsc::Sender<Response>,
    outbound: mpsc::Sender<Outbound>,
    status: watch::Sender<SessionStatus>,
}

/// Owns the dispatcher and the per-session channels.
pub struct DispatchLoop<E, H> {
    dispatcher: Dispatcher<E, H>,
    intake: mpsc::Receiver<Connection>,
    requests_tx: mpsc::Sender<DispatchEvent>,
    requests_rx: mpsc::Receiver<DispatchEvent>,
    sessions: HashMap<SessionId, SessionHandle>,
    next_session_id: SessionId,
    outbound_capacity: usize,
}

impl<E, H> DispatchLoop<E, H>
where
    E: Environment,
    H: CredentialHasher,
{
    /// Loop fed by `intake`, with a request mailbox of `mailbox_capacity`
    /// and per-session writer queues of `outbound_capacity`.
    pub fn new(
        dispatcher: Dispatcher<E, H>,
        intake: mpsc::Receiver<Connection>,
        mailbox_capacity: usize,
        outbound_capacity: usize,
    ) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(mailbox_capacity.max(1));
        Self {
            dispatcher,
            intake,
            requests_tx,
            requests_rx,
            sessions: HashMap::new(),
            next_session_id: 1,
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    /// Run until the intake is closed and every session has ended.
    pub async fn run(mut self) {
        let mut intake_open = true;

        loop {
            if !intake_open && self.sessions.is_empty() {
                break;
            }

            tokio::select! {
                connection = self.intake.recv(), if intake_open => match connection {
                    Some(connection) => self.register(connection),
                    None => {
                        debug!("connection intake closed");
                        intake_open = false;
                    }
                },
                Some(event) = self.requests_rx.recv() => self.handle(event),
                else => break,
            }
        }

        info!("dispatcher stopped");
    }

    fn register(&mut self, connection: Connection) {
        let session_id = self.next_session_id;
        self.next_session_id += 1;

        let Connection { peer, kind, reader, writer } = connection;
        let (replies_tx, replies_rx) = mpsc::channel(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_capacity);
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());

        self.sessions.insert(
            session_id,
            SessionHandle { replies: replies_tx, outbound: outbound_tx.clone(), status: status_tx },
        );
        self.handle(DispatchEvent::Connected { session_id, peer });

        tokio::spawn(run_writer(writer, outbound_rx, status_rx.clone(), peer));
        tokio::spawn(
            SessionWorker {
                session_id,
                peer,
                kind,
                reader,
                requests: self.requests_tx.clone(),
                replies: replies_rx,
                outbound: outbound_tx,
                status: status_rx,
            }
            .run(),
        );
    }

    fn handle(&mut self, event: DispatchEvent) {
        for action in self.dispatcher.process_event(event) {
            self.apply(action);
        }
    }

    fn apply(&mut self, action: DispatchAction) {
        match action {
            DispatchAction::Reply { session_id, response } => {
                let Some(handle) = self.sessions.get(&session_id) else {
                    debug!(session_id, "reply for closed session dropped");
                    return;
                };
                // One request in flight per session, so the slot is free
                if handle.replies.try_send(response).is_err() {
                    warn!(session_id, "reply mailbox unavailable");
                }
            }
            DispatchAction::Deliver { session_id, lines } => {
                let Some(handle) = self.sessions.get(&session_id) else {
                    return;
                };
                match handle.outbound.try_send(Outbound::Lines(lines)) {
                    Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(session_id, "outbound queue full, message dropped");
                    }
                }
            }
            DispatchAction::StatusChanged { session_id, status } => {
                if let Some(handle) = self.sessions.get(&session_id) {
                    handle.status.send_replace(status);
                }
            }
            DispatchAction::Disconnect { session_id } => {
                self.sessions.remove(&session_id);
            }
        }
    }
}
