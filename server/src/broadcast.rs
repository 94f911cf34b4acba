//! State fan-out to every joined session

use crate::game::{Capture, GameStateStore};
use crate::outbound::SessionId;
use log::{debug, error, warn};
use shared::{encode_line, ServerMessage};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub revision: u64,
    pub delivered: usize,
    /// Sessions whose queue refused the snapshot and were scheduled for cleanup
    pub evicted: Vec<SessionId>,
}

#[derive(Clone)]
pub struct Broadcaster {
    store: Arc<GameStateStore>,
}

impl Broadcaster {
    pub fn new(store: Arc<GameStateStore>) -> Self {
        Self { store }
    }

    /// Sends the current state to every joined session.
    ///
    /// The snapshot and recipient list are copied under the state lock; the
    /// lock is released before anything is encoded or queued. One session
    /// failing to accept the snapshot never affects delivery to the others.
    pub async fn broadcast(&self) -> BroadcastReport {
        let capture = self.store.capture().await;
        fan_out(capture)
    }
}

fn fan_out(capture: Capture) -> BroadcastReport {
    let Capture {
        revision,
        snapshot,
        recipients,
    } = capture;

    let mut report = BroadcastReport {
        revision,
        ..BroadcastReport::default()
    };

    if recipients.is_empty() {
        return report;
    }

    let line: Arc<str> = match encode_line(&ServerMessage::StateUpdate {
        game_state: snapshot,
    }) {
        Ok(line) => Arc::from(line),
        Err(e) => {
            error!("Failed to encode state update r{}: {}", revision, e);
            return report;
        }
    };

    for session in recipients {
        match session.deliver_state(revision, Arc::clone(&line)) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!("Dropping session {} from broadcast: {}", session.id(), e);
                report.evicted.push(session.id());
            }
        }
    }

    debug!(
        "Broadcast r{} to {} sessions ({} evicted)",
        revision,
        report.delivered,
        report.evicted.len()
    );
    report
}
