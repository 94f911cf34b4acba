use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const FIELD_WIDTH: f32 = 1280.0;
pub const FIELD_HEIGHT: f32 = 720.0;
pub const PUCK_CENTER: Position = (FIELD_WIDTH / 2.0, FIELD_HEIGHT / 2.0);
pub const ORIGIN: Position = (0.0, 0.0);

/// Field coordinate, encoded on the wire as `[x, y]`.
pub type Position = (f32, f32);

/// Opaque player token handed out on join.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaddleId(String);

impl PaddleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The paddle created for a player on join shares the player's token.
    pub fn home_of(player: &PlayerId) -> Self {
        Self(player.0.clone())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaddleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PaddleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Side::Left),
            "right" => Ok(Side::Right),
            other => Err(format!("unknown side '{}'", other)),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Puck {
    pub position: Position,
    pub velocity: Position,
}

impl Puck {
    pub fn centered() -> Self {
        Self {
            position: PUCK_CENTER,
            velocity: ORIGIN,
        }
    }
}

impl Default for Puck {
    fn default() -> Self {
        Self::centered()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub left: u32,
    pub right: u32,
}

impl Score {
    pub fn increment(&mut self, side: Side) {
        match side {
            Side::Left => self.left = self.left.saturating_add(1),
            Side::Right => self.right = self.right.saturating_add(1),
        }
    }
}

/// Per-paddle entry of a broadcast snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaddleView {
    pub position: Position,
    pub velocity: Position,
    #[serde(default)]
    pub locked_by: Option<PlayerId>,
}

/// Full game state as sent in `join_ack` and `state_update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub paddles: BTreeMap<PaddleId, PaddleView>,
    pub puck: Puck,
    pub score: Score,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    Join {
        #[serde(default)]
        player_id: Option<PlayerId>,
    },
    UpdatePosition {
        #[serde(default)]
        player_id: Option<PlayerId>,
        position: Position,
    },
    GrabPaddle {
        #[serde(default)]
        player_id: Option<PlayerId>,
        paddle_id: PaddleId,
    },
    ReleasePaddle {
        #[serde(default)]
        player_id: Option<PlayerId>,
        paddle_id: PaddleId,
    },
    Disconnect {
        #[serde(default)]
        player_id: Option<PlayerId>,
    },
}

impl ClientMessage {
    pub fn player_id(&self) -> Option<&PlayerId> {
        match self {
            ClientMessage::Join { player_id }
            | ClientMessage::UpdatePosition { player_id, .. }
            | ClientMessage::GrabPaddle { player_id, .. }
            | ClientMessage::ReleasePaddle { player_id, .. }
            | ClientMessage::Disconnect { player_id } => player_id.as_ref(),
        }
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        encode_line(self)
    }

    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }

    /// Decodes a raw frame. Bytes that are not valid UTF-8 are reported as a
    /// JSON error like any other malformed input.
    pub fn from_bytes(frame: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(frame)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerMessage {
    JoinAck {
        player_id: PlayerId,
        paddle_id: PaddleId,
        game_state: GameSnapshot,
    },
    UpdateAck {
        status: AckStatus,
        player_id: PlayerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    GrabAck {
        status: AckStatus,
        paddle_id: PaddleId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ReleaseAck {
        status: AckStatus,
        paddle_id: PaddleId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Error {
        message: String,
    },
    StateUpdate {
        game_state: GameSnapshot,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        encode_line(self)
    }

    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }
}

/// Encodes one message as a single newline-terminated JSON frame.
pub fn encode_line<T: Serialize>(message: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}
