//! Session lifecycle: join, authorization of actions, disconnect
//!
//! A session is one accepted connection. It may bind to at most one player
//! through `join`; every later action has to carry that player's id. The live
//! session count includes connections that never joined. When the last
//! session leaves, the server is told to stop accepting.

use crate::broadcast::{BroadcastReport, Broadcaster};
use crate::error::SessionError;
use crate::game::{GameStateStore, Registration};
use crate::outbound::{Outbound, SessionHandle, SessionId};
use crate::shutdown::Shutdown;
use log::{debug, info};
use shared::PlayerId;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct SessionLifecycle {
    store: Arc<GameStateStore>,
    broadcaster: Broadcaster,
    shutdown: Shutdown,
    live_sessions: AtomicUsize,
    next_session_id: AtomicU64,
    queue_capacity: usize,
}

impl SessionLifecycle {
    pub fn new(store: Arc<GameStateStore>, shutdown: Shutdown, queue_capacity: usize) -> Self {
        let broadcaster = Broadcaster::new(Arc::clone(&store));
        Self {
            store,
            broadcaster,
            shutdown,
            live_sessions: AtomicUsize::new(0),
            next_session_id: AtomicU64::new(1),
            queue_capacity,
        }
    }

    pub fn store(&self) -> &Arc<GameStateStore> {
        &self.store
    }

    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }

    /// Counts a newly accepted connection and creates its outbound queue.
    pub fn open_session(&self) -> (SessionHandle, mpsc::Receiver<Outbound>) {
        let id = SessionId(self.next_session_id.fetch_add(1, Ordering::SeqCst));
        let live = self.live_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Session {} opened ({} live)", id, live);
        SessionHandle::new(id, self.queue_capacity)
    }

    /// Binds the session to a player, registering one if needed, and queues
    /// the `join_ack` on the session.
    ///
    /// A session that already joined always gets its existing binding back,
    /// whatever id it presents this time.
    pub async fn join(
        &self,
        session: &SessionHandle,
        bound: Option<&PlayerId>,
        presented: Option<&PlayerId>,
    ) -> Registration {
        self.store.join(session, bound.or(presented)).await
    }

    /// Checks that a non-join action carries the id of a live player bound to
    /// this session.
    pub async fn authorize(
        &self,
        session: &SessionHandle,
        player_id: Option<&PlayerId>,
    ) -> Result<PlayerId, SessionError> {
        let player_id = player_id
            .filter(|id| !id.as_str().is_empty())
            .ok_or(SessionError::InvalidSession)?;

        match self.store.session_of(player_id).await {
            Some(owner) if owner == session.id() => Ok(player_id.clone()),
            _ => Err(SessionError::InvalidSession),
        }
    }

    pub async fn broadcast(&self) -> BroadcastReport {
        self.broadcaster.broadcast().await
    }

    /// Tears a session down. Consumes the handle, so it runs once per session.
    ///
    /// Removes the bound player (if any), broadcasts the resulting state and
    /// stops the server when this was the last live session. Returns the
    /// number of sessions still live.
    pub async fn disconnect(&self, session: SessionHandle, player: Option<&PlayerId>) -> usize {
        if let Some(player_id) = player {
            if let Some(departure) = self.store.remove_player(player_id).await {
                debug!(
                    "Session {} cleanup: released {:?}, reassigned {:?}",
                    session.id(),
                    departure.released,
                    departure.reassigned
                );
            }
        }

        let remaining = self.decrement_live();
        info!("Session {} disconnected ({} live)", session.id(), remaining);
        drop(session);

        self.broadcaster.broadcast().await;

        if remaining == 0 {
            info!("No active sessions, shutting down server");
            self.shutdown.trigger();
        }
        remaining
    }

    fn decrement_live(&self) -> usize {
        let previous = self
            .live_sessions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                Some(live.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }
}
