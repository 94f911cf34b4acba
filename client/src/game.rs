use log::debug;
use shared::{AckStatus, GameSnapshot, PaddleId, PlayerId, ServerMessage};

/// What the client knows about its own session and the shared game.
#[derive(Debug, Clone, Default)]
pub struct ClientGameState {
    pub player_id: Option<PlayerId>,
    pub home_paddle: Option<PaddleId>,
    pub controlling: Option<PaddleId>,
    pub latest: Option<GameSnapshot>,
    pub updates_received: u64,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_joined(&self) -> bool {
        self.player_id.is_some()
    }

    /// Folds a server message into the local view.
    pub fn apply(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::JoinAck {
                player_id,
                paddle_id,
                game_state,
            } => {
                self.player_id = Some(player_id.clone());
                self.home_paddle = Some(paddle_id.clone());
                if self.controlling.is_none() {
                    self.controlling = Some(paddle_id.clone());
                }
                self.latest = Some(game_state.clone());
            }
            ServerMessage::StateUpdate { game_state } => {
                self.updates_received += 1;
                self.latest = Some(game_state.clone());
                self.drop_vanished_control();
            }
            ServerMessage::GrabAck {
                status: AckStatus::Success,
                paddle_id,
                ..
            } => {
                self.controlling = Some(paddle_id.clone());
            }
            ServerMessage::ReleaseAck {
                status: AckStatus::Success,
                paddle_id,
                ..
            } => {
                if self.controlling.as_ref() == Some(paddle_id) {
                    self.controlling = self.home_paddle.clone();
                }
            }
            _ => {}
        }
    }

    // Mirrors the server: a paddle that left with its owner hands control back
    // to our own paddle.
    fn drop_vanished_control(&mut self) {
        let (Some(latest), Some(controlling)) = (&self.latest, &self.controlling) else {
            return;
        };
        if !latest.paddles.contains_key(controlling) {
            debug!("Paddle {} vanished, back to own paddle", controlling);
            self.controlling = self.home_paddle.clone();
        }
    }
}
