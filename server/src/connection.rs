//! Per-connection read loop and message dispatch
//!
//! Each accepted connection gets one `ConnectionHandler` running on its own
//! task. The handler reads newline-delimited JSON frames, dispatches them,
//! replies to the requester and then broadcasts the resulting state. Frames
//! are split on raw bytes, so a line that is not UTF-8 is just another
//! malformed message. Whatever
//! ends the loop (EOF, transport error, explicit disconnect, eviction, idle
//! timeout) the disconnect cleanup runs exactly once afterwards.

use crate::config::ServerConfig;
use crate::ownership::{grab_ack, release_ack};
use crate::outbound::{run_writer, Outbound, SessionHandle};
use crate::session::SessionLifecycle;
use futures::StreamExt;
use log::{debug, info, warn};
use shared::{AckStatus, ClientMessage, PlayerId, ServerMessage};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};

/// Why a connection's read loop ended
#[derive(Debug)]
pub enum ExitReason {
    Eof,
    Requested,
    Evicted,
    IdleTimeout,
    Oversized,
    Transport(std::io::Error),
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Eof => f.write_str("connection closed by peer"),
            ExitReason::Requested => f.write_str("disconnect requested"),
            ExitReason::Evicted => f.write_str("evicted"),
            ExitReason::IdleTimeout => f.write_str("idle timeout"),
            ExitReason::Oversized => f.write_str("message too large"),
            ExitReason::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

enum Frame {
    Line(Vec<u8>),
    Exit(ExitReason),
}

pub struct ConnectionHandler {
    lifecycle: Arc<SessionLifecycle>,
    session: SessionHandle,
    peer: String,
    config: Arc<ServerConfig>,
    player: Option<PlayerId>,
}

impl ConnectionHandler {
    pub fn new(
        lifecycle: Arc<SessionLifecycle>,
        session: SessionHandle,
        peer: impl Into<String>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            lifecycle,
            session,
            peer: peer.into(),
            config,
            player: None,
        }
    }

    /// Serves the connection until it ends, then cleans up.
    pub async fn run<S>(mut self, stream: S, outbound: mpsc::Receiver<Outbound>) -> ExitReason
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let writer = tokio::spawn(run_writer(
            write_half,
            outbound,
            self.session.eviction(),
            self.session.id(),
        ));

        let mut frames = FramedRead::new(
            read_half,
            AnyDelimiterCodec::new_with_max_length(
                b"\n".to_vec(),
                b"\n".to_vec(),
                self.config.max_message_bytes,
            ),
        );

        info!("Session {} connected from {}", self.session.id(), self.peer);
        let reason = self.read_loop(&mut frames).await;
        info!(
            "Session {} ({}) closing: {}",
            self.session.id(),
            self.peer,
            reason
        );

        let ConnectionHandler {
            lifecycle,
            session,
            player,
            ..
        } = self;
        lifecycle.disconnect(session, player.as_ref()).await;
        drop(frames);

        // An evicted peer is not reading, so its writer may never finish.
        // Otherwise the writer drains what is still queued and closes the
        // transport once the last handle to this session is gone.
        if matches!(reason, ExitReason::Evicted) {
            writer.abort();
        }
        match writer.await {
            Err(e) if !e.is_cancelled() => warn!("Writer task failed: {}", e),
            _ => {}
        }
        reason
    }

    async fn read_loop<R>(&mut self, frames: &mut FramedRead<R, AnyDelimiterCodec>) -> ExitReason
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.session.evicted() => Frame::Exit(ExitReason::Evicted),
                frame = next_frame(frames, &self.config) => frame,
            };

            let line = match frame {
                Frame::Line(line) => line,
                Frame::Exit(ExitReason::Oversized) => {
                    self.reply(&ServerMessage::error(format!(
                        "malformed message: longer than {} bytes",
                        self.config.max_message_bytes
                    )));
                    return ExitReason::Oversized;
                }
                Frame::Exit(reason) => return reason,
            };

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let message = match ClientMessage::from_bytes(&line) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Session {} sent malformed message: {}", self.session.id(), e);
                    self.reply(&ServerMessage::error(format!("malformed message: {}", e)));
                    continue;
                }
            };

            if let ClientMessage::Disconnect { .. } = message {
                return ExitReason::Requested;
            }

            self.dispatch(message).await;
            self.lifecycle.broadcast().await;
        }
    }

    async fn dispatch(&mut self, message: ClientMessage) {
        let response = match message {
            // The join_ack is queued by the store together with the registration.
            ClientMessage::Join { player_id } => {
                let joined = self
                    .lifecycle
                    .join(&self.session, self.player.as_ref(), player_id.as_ref())
                    .await;
                self.player = Some(joined.player_id);
                return;
            }
            ClientMessage::UpdatePosition {
                player_id,
                position,
            } => match self.authorize(player_id.as_ref()).await {
                Ok(player_id) => {
                    match self
                        .lifecycle
                        .store()
                        .update_paddle_position(&player_id, position)
                        .await
                    {
                        Ok(_) => ServerMessage::UpdateAck {
                            status: AckStatus::Success,
                            player_id,
                            reason: None,
                        },
                        Err(e) => ServerMessage::UpdateAck {
                            status: AckStatus::Failed,
                            player_id,
                            reason: Some(e.to_string()),
                        },
                    }
                }
                Err(response) => response,
            },
            ClientMessage::GrabPaddle {
                player_id,
                paddle_id,
            } => match self.authorize(player_id.as_ref()).await {
                Ok(player_id) => {
                    let result = self
                        .lifecycle
                        .store()
                        .grab_paddle(&player_id, &paddle_id)
                        .await;
                    if let Err(e) = &result {
                        debug!("Player {} failed to grab {}: {}", player_id, paddle_id, e);
                    }
                    grab_ack(paddle_id, &result)
                }
                Err(response) => response,
            },
            ClientMessage::ReleasePaddle {
                player_id,
                paddle_id,
            } => match self.authorize(player_id.as_ref()).await {
                Ok(player_id) => {
                    let result = self
                        .lifecycle
                        .store()
                        .release_paddle(&player_id, &paddle_id)
                        .await;
                    if let Err(e) = &result {
                        debug!(
                            "Player {} failed to release {}: {}",
                            player_id, paddle_id, e
                        );
                    }
                    release_ack(paddle_id, &result)
                }
                Err(response) => response,
            },
            // Handled by the read loop before dispatch.
            ClientMessage::Disconnect { .. } => return,
        };

        self.reply(&response);
    }

    async fn authorize(&self, player_id: Option<&PlayerId>) -> Result<PlayerId, ServerMessage> {
        self.lifecycle
            .authorize(&self.session, player_id)
            .await
            .map_err(|e| {
                debug!("Session {} rejected: {}", self.session.id(), e);
                ServerMessage::error(e.to_string())
            })
    }

    fn reply(&self, message: &ServerMessage) {
        if let Err(e) = self.session.send(message) {
            warn!("Failed to reply to session {}: {}", self.session.id(), e);
        }
    }
}

async fn next_frame<R>(
    frames: &mut FramedRead<R, AnyDelimiterCodec>,
    config: &ServerConfig,
) -> Frame
where
    R: AsyncRead + Unpin,
{
    let next = match config.idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, frames.next()).await {
            Ok(next) => next,
            Err(_) => return Frame::Exit(ExitReason::IdleTimeout),
        },
        None => frames.next().await,
    };

    match next {
        Some(Ok(chunk)) => Frame::Line(chunk.to_vec()),
        Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
            Frame::Exit(ExitReason::Oversized)
        }
        Some(Err(AnyDelimiterCodecError::Io(e))) => Frame::Exit(ExitReason::Transport(e)),
        None => Frame::Exit(ExitReason::Eof),
    }
}
