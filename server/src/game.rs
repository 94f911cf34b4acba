//! Authoritative shared game state
//!
//! `GameStateStore` is the single owner of players, paddles, the puck and the
//! score. Every operation takes the state lock exactly once, so each one is
//! atomic with respect to the others and all mutations are linearized in lock
//! acquisition order. Nothing in here performs I/O while the lock is held;
//! broadcasting works from a `Capture` that is copied out under the lock.
//!
//! Players and paddles live in two identifier spaces. A player *owns* the
//! paddle created for it on join (its home paddle) and *controls* exactly one
//! paddle at a time, which starts as the home paddle and moves on a grab.

use crate::error::StoreError;
use crate::outbound::{SessionHandle, SessionId};
use crate::ownership::{OwnershipError, PaddleLock};
use log::{debug, info, warn};
use shared::{
    GameSnapshot, PaddleId, PaddleView, PlayerId, Position, Puck, Score, ServerMessage, Side,
    ORIGIN,
};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug)]
struct PlayerRecord {
    home_paddle: PaddleId,
    controls: PaddleId,
    last_position: Option<Position>,
    session: SessionHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paddle {
    pub id: PaddleId,
    pub lock: PaddleLock,
    pub position: Position,
    pub velocity: Position,
}

impl Paddle {
    fn new(id: PaddleId) -> Self {
        Self {
            id,
            lock: PaddleLock::Free,
            position: ORIGIN,
            velocity: ORIGIN,
        }
    }

    fn view(&self) -> PaddleView {
        PaddleView {
            position: self.position,
            velocity: self.velocity,
            locked_by: self.lock.owner().cloned(),
        }
    }
}

#[derive(Debug, Default)]
struct GameState {
    revision: u64,
    players: HashMap<PlayerId, PlayerRecord>,
    paddles: BTreeMap<PaddleId, Paddle>,
    puck: Puck,
    score: Score,
}

impl GameState {
    fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            paddles: self
                .paddles
                .iter()
                .map(|(id, paddle)| (id.clone(), paddle.view()))
                .collect(),
            puck: self.puck,
            score: self.score,
        }
    }

    fn fresh_player_id(&self) -> PlayerId {
        loop {
            let candidate = PlayerId::new(Uuid::new_v4().to_string());
            if !self.players.contains_key(&candidate)
                && !self.paddles.contains_key(&PaddleId::home_of(&candidate))
            {
                return candidate;
            }
        }
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    fn register(&mut self, session: &SessionHandle, presented: Option<&PlayerId>) -> Registration {
        if let Some(player_id) = presented {
            match self.players.get(player_id) {
                Some(record) if record.session.id() == session.id() => {
                    debug!("Player {} rejoined on session {}", player_id, session.id());
                    return Registration {
                        player_id: player_id.clone(),
                        paddle_id: record.home_paddle.clone(),
                        rejoined: true,
                        revision: self.revision,
                        game_state: self.snapshot(),
                    };
                }
                Some(record) => warn!(
                    "Session {} presented player {} owned by session {}, registering a new player",
                    session.id(),
                    player_id,
                    record.session.id()
                ),
                None => debug!(
                    "Session {} presented unknown player {}, registering a new player",
                    session.id(),
                    player_id
                ),
            }
        }

        let player_id = self.fresh_player_id();
        let paddle_id = PaddleId::home_of(&player_id);

        self.paddles
            .insert(paddle_id.clone(), Paddle::new(paddle_id.clone()));
        self.players.insert(
            player_id.clone(),
            PlayerRecord {
                home_paddle: paddle_id.clone(),
                controls: paddle_id.clone(),
                last_position: None,
                session: session.clone(),
            },
        );
        self.bump();

        info!("Player {} joined with paddle {}", player_id, paddle_id);
        Registration {
            player_id,
            paddle_id,
            rejoined: false,
            revision: self.revision,
            game_state: self.snapshot(),
        }
    }
}

/// Binding handed back by `register_player`, with the state it was made in
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub player_id: PlayerId,
    pub paddle_id: PaddleId,
    /// True when an existing binding was returned instead of a new player
    pub rejoined: bool,
    pub revision: u64,
    pub game_state: GameSnapshot,
}

/// What `remove_player` cleaned up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub player_id: PlayerId,
    pub removed_paddle: PaddleId,
    /// Foreign paddles whose lock the departing player still held
    pub released: Vec<PaddleId>,
    /// Players that were controlling the removed paddle and fell back home
    pub reassigned: Vec<PlayerId>,
}

/// A snapshot together with everyone it should be sent to, copied atomically.
#[derive(Debug, Clone)]
pub struct Capture {
    pub revision: u64,
    pub snapshot: GameSnapshot,
    pub recipients: Vec<SessionHandle>,
}

pub struct GameStateStore {
    state: RwLock<GameState>,
}

impl Default for GameStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GameStateStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GameState::default()),
        }
    }

    /// Registers a new player with its own unlocked paddle at the origin.
    ///
    /// Presenting the id of a player already bound to the same session
    /// returns that binding unchanged, so join retries never create
    /// duplicates. Ids that are unknown, or that belong to another session,
    /// are not adopted; a fresh player is created instead.
    pub async fn register_player(
        &self,
        session: &SessionHandle,
        presented: Option<&PlayerId>,
    ) -> Registration {
        self.state.write().await.register(session, presented)
    }

    /// Registers like `register_player` and queues the `join_ack` on the
    /// session before the lock is released. A broadcast of any later revision
    /// is captured after this returns, so it can never overtake the ack.
    pub async fn join(
        &self,
        session: &SessionHandle,
        presented: Option<&PlayerId>,
    ) -> Registration {
        let mut state = self.state.write().await;
        let registration = state.register(session, presented);

        let ack = ServerMessage::JoinAck {
            player_id: registration.player_id.clone(),
            paddle_id: registration.paddle_id.clone(),
            game_state: registration.game_state.clone(),
        };
        if let Err(e) = session.send_with_state(registration.revision, &ack) {
            warn!("Failed to queue join_ack for session {}: {}", session.id(), e);
        }
        registration
    }

    /// Moves the paddle the player currently controls.
    ///
    /// Returns the id of the paddle that moved.
    pub async fn update_paddle_position(
        &self,
        player_id: &PlayerId,
        position: Position,
    ) -> Result<PaddleId, StoreError> {
        if !(position.0.is_finite() && position.1.is_finite()) {
            return Err(StoreError::InvalidPosition);
        }

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let record = state
            .players
            .get_mut(player_id)
            .ok_or_else(|| StoreError::UnknownPlayer(player_id.clone()))?;
        let paddle = state
            .paddles
            .get_mut(&record.controls)
            .ok_or_else(|| StoreError::UnknownPlayer(player_id.clone()))?;

        record.last_position = Some(position);
        paddle.position = position;
        let paddle_id = paddle.id.clone();
        state.bump();

        debug!(
            "Updated position for player {}'s paddle {} to {:?}",
            player_id, paddle_id, position
        );
        Ok(paddle_id)
    }

    /// Locks a free paddle for `player_id` and hands it control of it.
    pub async fn grab_paddle(
        &self,
        player_id: &PlayerId,
        paddle_id: &PaddleId,
    ) -> Result<(), OwnershipError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let record = state
            .players
            .get_mut(player_id)
            .ok_or(OwnershipError::UnknownPlayer)?;
        let paddle = state
            .paddles
            .get_mut(paddle_id)
            .ok_or(OwnershipError::InvalidPaddle)?;

        paddle.lock.grab(player_id)?;
        record.controls = paddle_id.clone();
        state.bump();

        info!("Player {} grabbed paddle {}", player_id, paddle_id);
        Ok(())
    }

    /// Unlocks a paddle held by `player_id`.
    ///
    /// If the player was controlling that paddle, control returns to its home
    /// paddle.
    pub async fn release_paddle(
        &self,
        player_id: &PlayerId,
        paddle_id: &PaddleId,
    ) -> Result<(), OwnershipError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let paddle = state
            .paddles
            .get_mut(paddle_id)
            .ok_or(OwnershipError::InvalidPaddle)?;
        paddle.lock.release(player_id)?;

        if let Some(record) = state.players.get_mut(player_id) {
            if &record.controls == paddle_id {
                record.controls = record.home_paddle.clone();
            }
        }
        state.bump();

        info!("Player {} released paddle {}", player_id, paddle_id);
        Ok(())
    }

    /// Deletes a player, its home paddle and every lock it still holds.
    ///
    /// The home paddle goes away even if another player had grabbed it; that
    /// player's control falls back to its own home paddle. Returns `None` if
    /// the player was already gone.
    pub async fn remove_player(&self, player_id: &PlayerId) -> Option<Departure> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let record = state.players.remove(player_id)?;
        state.paddles.remove(&record.home_paddle);

        let released: Vec<PaddleId> = state
            .paddles
            .values_mut()
            .filter_map(|paddle| {
                paddle
                    .lock
                    .release_if_held_by(player_id)
                    .then(|| paddle.id.clone())
            })
            .collect();

        let mut reassigned = Vec::new();
        for (other_id, other) in state.players.iter_mut() {
            if other.controls == record.home_paddle {
                other.controls = other.home_paddle.clone();
                reassigned.push(other_id.clone());
            }
        }
        state.bump();

        info!(
            "Removed player {} and paddle {} ({} locks released)",
            player_id,
            record.home_paddle,
            released.len()
        );
        Some(Departure {
            player_id: player_id.clone(),
            removed_paddle: record.home_paddle,
            released,
            reassigned,
        })
    }

    /// Scores a goal for `side` and puts the puck back on the center spot.
    pub async fn apply_goal(&self, side: Side) -> Score {
        let mut state = self.state.write().await;
        state.score.increment(side);
        state.puck = Puck::centered();
        state.bump();

        info!(
            "Goal for {} side, score is now {}-{}",
            side, state.score.left, state.score.right
        );
        state.score
    }

    pub async fn snapshot(&self) -> GameSnapshot {
        self.state.read().await.snapshot()
    }

    /// Copies the snapshot and the current recipient list in one critical
    /// section.
    pub async fn capture(&self) -> Capture {
        let state = self.state.read().await;
        Capture {
            revision: state.revision,
            snapshot: state.snapshot(),
            recipients: state
                .players
                .values()
                .map(|record| record.session.clone())
                .collect(),
        }
    }

    /// Session a player is bound to, if the player is live.
    pub async fn session_of(&self, player_id: &PlayerId) -> Option<SessionId> {
        let state = self.state.read().await;
        state.players.get(player_id).map(|record| record.session.id())
    }

    pub async fn controlled_paddle(&self, player_id: &PlayerId) -> Option<PaddleId> {
        let state = self.state.read().await;
        state
            .players
            .get(player_id)
            .map(|record| record.controls.clone())
    }

    pub async fn last_position(&self, player_id: &PlayerId) -> Option<Position> {
        let state = self.state.read().await;
        state
            .players
            .get(player_id)
            .and_then(|record| record.last_position)
    }

    pub async fn paddle(&self, paddle_id: &PaddleId) -> Option<Paddle> {
        self.state.read().await.paddles.get(paddle_id).cloned()
    }

    pub async fn player_count(&self) -> usize {
        self.state.read().await.players.len()
    }

    pub async fn revision(&self) -> u64 {
        self.state.read().await.revision
    }
}
