//! Per-session outbound path
//!
//! Every session owns a bounded queue drained by its own writer task. Sending
//! to a session never waits on the peer: a message is either queued at once or
//! the session is scheduled for eviction. The writer task is the only place
//! that touches the socket's write half.

use crate::error::DeliveryError;
use log::{debug, warn};
use shared::ServerMessage;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};

/// Server-assigned identifier of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Items queued for a session's writer task
#[derive(Debug)]
pub enum Outbound {
    /// A reply addressed to this session only
    Direct(String),
    /// A broadcast snapshot tagged with the store revision it was taken at
    State { revision: u64, line: Arc<str> },
    /// A reply addressed to this session that embeds a snapshot taken at
    /// `revision`
    StateReply { revision: u64, line: String },
}

/// Cheap, cloneable sending side of a session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    tx: mpsc::Sender<Outbound>,
    eviction: Arc<Notify>,
}

impl SessionHandle {
    pub fn new(id: SessionId, capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id,
            tx,
            eviction: Arc::new(Notify::new()),
        };
        (handle, rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Encodes and queues a direct reply.
    pub fn send(&self, message: &ServerMessage) -> Result<(), DeliveryError> {
        let line = message.to_line()?;
        self.enqueue(Outbound::Direct(line))
    }

    /// Encodes and queues a reply carrying the state at `revision`.
    pub fn send_with_state(
        &self,
        revision: u64,
        message: &ServerMessage,
    ) -> Result<(), DeliveryError> {
        let line = message.to_line()?;
        self.enqueue(Outbound::StateReply { revision, line })
    }

    /// Queues an already encoded snapshot shared between all recipients.
    pub fn deliver_state(&self, revision: u64, line: Arc<str>) -> Result<(), DeliveryError> {
        self.enqueue(Outbound::State { revision, line })
    }

    fn enqueue(&self, item: Outbound) -> Result<(), DeliveryError> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("Session {} outbound queue full, evicting", self.id);
                self.evict();
                Err(DeliveryError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                self.evict();
                Err(DeliveryError::Closed)
            }
        }
    }

    /// Asks the session's connection handler to stop and clean up.
    pub fn evict(&self) {
        self.eviction.notify_one();
    }

    /// Resolves once the session has been evicted.
    pub async fn evicted(&self) {
        self.eviction.notified().await;
    }

    pub(crate) fn eviction(&self) -> Arc<Notify> {
        Arc::clone(&self.eviction)
    }
}

/// Drains a session's queue into its transport until every sender is gone.
///
/// Snapshots older than one already written are skipped, so a client never
/// sees the game state move backwards even when two broadcasts race each
/// other after leaving the state lock. A write failure evicts the session.
pub async fn run_writer<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<Outbound>,
    eviction: Arc<Notify>,
    session: SessionId,
) where
    W: AsyncWrite + Unpin,
{
    let mut last_revision = 0u64;

    while let Some(item) = rx.recv().await {
        let result = match &item {
            Outbound::Direct(line) => writer.write_all(line.as_bytes()).await,
            Outbound::State { revision, line } => {
                if *revision < last_revision {
                    debug!(
                        "Session {} skipping stale snapshot r{} (already sent r{})",
                        session, revision, last_revision
                    );
                    continue;
                }
                last_revision = *revision;
                writer.write_all(line.as_bytes()).await
            }
            Outbound::StateReply { revision, line } => {
                last_revision = last_revision.max(*revision);
                writer.write_all(line.as_bytes()).await
            }
        };

        if let Err(e) = result {
            warn!("Failed to write to session {}: {}", session, e);
            eviction.notify_one();
            break;
        }
    }

    let _ = writer.shutdown().await;
    debug!("Writer for session {} finished", session);
}
