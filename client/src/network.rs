use crate::game::ClientGameState;
use futures::StreamExt;
use log::{debug, info, warn};
use shared::{ClientMessage, GameSnapshot, PaddleId, PlayerId, Position, ServerMessage};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

/// Generous upper bound for inbound lines; snapshots grow with the player count.
const MAX_INBOUND_LINE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("framing error: {0}")]
    Framing(#[from] LinesCodecError),
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("connection closed")]
    Closed,
    #[error("not joined yet")]
    NotJoined,
    #[error("server error: {0}")]
    Server(String),
}

/// Identity handed out by the server on join
#[derive(Debug, Clone)]
pub struct Joined {
    pub player_id: PlayerId,
    pub paddle_id: PaddleId,
    pub game_state: GameSnapshot,
}

pub struct PaddleClient {
    frames: FramedRead<OwnedReadHalf, LinesCodec>,
    writer: OwnedWriteHalf,
    state: ClientGameState,
}

impl PaddleClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", stream.peer_addr()?);

        let (read_half, writer) = stream.into_split();
        Ok(Self {
            frames: FramedRead::new(
                read_half,
                LinesCodec::new_with_max_length(MAX_INBOUND_LINE),
            ),
            writer,
            state: ClientGameState::new(),
        })
    }

    pub fn state(&self) -> &ClientGameState {
        &self.state
    }

    pub fn player_id(&self) -> Option<&PlayerId> {
        self.state.player_id.as_ref()
    }

    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        let line = message.to_line()?;
        self.send_raw(&line).await
    }

    /// Writes bytes as-is. Used to exercise the server with malformed input.
    pub async fn send_raw(&mut self, line: &str) -> Result<(), ClientError> {
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Next message from the server, folded into the local state.
    pub async fn recv(&mut self) -> Result<ServerMessage, ClientError> {
        let line = match self.frames.next().await {
            Some(line) => line?,
            None => return Err(ClientError::Closed),
        };
        let message = ServerMessage::from_line(&line)?;
        self.state.apply(&message);
        Ok(message)
    }

    /// Reads until a message matches, folding everything skipped into the
    /// local state.
    pub async fn recv_where<F>(&mut self, mut matches: F) -> Result<ServerMessage, ClientError>
    where
        F: FnMut(&ServerMessage) -> bool,
    {
        loop {
            let message = self.recv().await?;
            if matches(&message) {
                return Ok(message);
            }
            debug!("Skipping {:?}", message);
        }
    }

    /// Next direct reply, skipping broadcasts.
    pub async fn recv_reply(&mut self) -> Result<ServerMessage, ClientError> {
        self.recv_where(|message| !matches!(message, ServerMessage::StateUpdate { .. }))
            .await
    }

    /// Next broadcast snapshot.
    pub async fn recv_state(&mut self) -> Result<GameSnapshot, ClientError> {
        loop {
            if let ServerMessage::StateUpdate { game_state } = self.recv().await? {
                return Ok(game_state);
            }
        }
    }

    pub async fn join(&mut self) -> Result<Joined, ClientError> {
        let presented = self.state.player_id.clone();
        self.join_as(presented).await
    }

    pub async fn join_as(&mut self, player_id: Option<PlayerId>) -> Result<Joined, ClientError> {
        self.send(&ClientMessage::Join { player_id }).await?;
        match self.recv_reply().await? {
            ServerMessage::JoinAck {
                player_id,
                paddle_id,
                game_state,
            } => {
                info!("Joined as {} with paddle {}", player_id, paddle_id);
                Ok(Joined {
                    player_id,
                    paddle_id,
                    game_state,
                })
            }
            ServerMessage::Error { message } => Err(ClientError::Server(message)),
            other => {
                warn!("Unexpected reply to join: {:?}", other);
                Err(ClientError::Server(format!("unexpected reply {:?}", other)))
            }
        }
    }

    pub async fn update_position(&mut self, position: Position) -> Result<ServerMessage, ClientError> {
        let player_id = Some(self.joined_id()?);
        self.send(&ClientMessage::UpdatePosition {
            player_id,
            position,
        })
        .await?;
        self.recv_reply().await
    }

    pub async fn grab_paddle(&mut self, paddle_id: PaddleId) -> Result<ServerMessage, ClientError> {
        let player_id = Some(self.joined_id()?);
        self.send(&ClientMessage::GrabPaddle {
            player_id,
            paddle_id,
        })
        .await?;
        self.recv_reply().await
    }

    pub async fn release_paddle(
        &mut self,
        paddle_id: PaddleId,
    ) -> Result<ServerMessage, ClientError> {
        let player_id = Some(self.joined_id()?);
        self.send(&ClientMessage::ReleasePaddle {
            player_id,
            paddle_id,
        })
        .await?;
        self.recv_reply().await
    }

    /// Says goodbye and closes the write side.
    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        let player_id = self.state.player_id.clone();
        self.send(&ClientMessage::Disconnect { player_id }).await?;
        self.writer.shutdown().await?;
        info!("Disconnected");
        Ok(())
    }

    fn joined_id(&self) -> Result<PlayerId, ClientError> {
        self.state.player_id.clone().ok_or(ClientError::NotJoined)
    }
}
