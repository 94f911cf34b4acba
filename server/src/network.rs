//! Server network layer: listening socket, accept loop and lifecycle surface

use crate::broadcast::BroadcastReport;
use crate::config::ServerConfig;
use crate::connection::ConnectionHandler;
use crate::error::ServerError;
use crate::game::GameStateStore;
use crate::session::SessionLifecycle;
use crate::shutdown::Shutdown;
use log::{error, info};
use shared::{GameSnapshot, Score, Side};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// A running game server.
///
/// Dropping the handle does not stop the server; call `stop` for that, or let
/// the last session leave.
pub struct GameServer {
    lifecycle: Arc<SessionLifecycle>,
    shutdown: Shutdown,
    closed: watch::Receiver<bool>,
    local_addr: SocketAddr,
}

impl GameServer {
    /// Binds `host:port` with default settings and starts accepting.
    pub async fn start(host: &str, port: u16) -> Result<Self, ServerError> {
        Self::start_with_config(ServerConfig::new(host, port)).await
    }

    pub async fn start_with_config(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_address()).await?;
        let local_addr = listener.local_addr()?;
        info!("Server started, listening on {}", local_addr);

        let shutdown = Shutdown::new();
        let store = Arc::new(GameStateStore::new());
        let lifecycle = Arc::new(SessionLifecycle::new(
            store,
            shutdown.clone(),
            config.outbound_queue,
        ));
        let (closed_tx, closed) = watch::channel(false);

        tokio::spawn(accept_loop(
            listener,
            Arc::clone(&lifecycle),
            Arc::new(config),
            shutdown.clone(),
            closed_tx,
        ));

        Ok(Self {
            lifecycle,
            shutdown,
            closed,
            local_addr,
        })
    }

    /// Port the server is listening on, `None` once it is stopping.
    pub fn current_port(&self) -> Option<u16> {
        if self.shutdown.is_triggered() || *self.closed.borrow() {
            None
        } else {
            Some(self.local_addr.port())
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.current_port().is_some()
    }

    /// Closes the listening socket and waits for the accept loop to end.
    /// Sessions already connected keep running until they disconnect.
    pub async fn stop(&self) {
        self.shutdown.trigger();
        self.stopped().await;
    }

    /// Resolves once the listening socket has been closed, either through
    /// `stop` or because the last session left.
    pub async fn stopped(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// External goal trigger: bumps the score, re-centers the puck and pushes
    /// the new state to every session.
    pub async fn goal_event(&self, side: Side) -> Score {
        let score = self.lifecycle.store().apply_goal(side).await;
        self.lifecycle.broadcast().await;
        score
    }

    pub async fn broadcast(&self) -> BroadcastReport {
        self.lifecycle.broadcast().await
    }

    pub async fn snapshot(&self) -> GameSnapshot {
        self.lifecycle.store().snapshot().await
    }

    pub fn live_sessions(&self) -> usize {
        self.lifecycle.live_sessions()
    }
}

async fn accept_loop(
    listener: TcpListener,
    lifecycle: Arc<SessionLifecycle>,
    config: Arc<ServerConfig>,
    shutdown: Shutdown,
    closed: watch::Sender<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if shutdown.is_triggered() {
                        info!("Refusing connection from {}: server stopping", peer);
                        break;
                    }
                    if let Err(e) = stream.set_nodelay(true) {
                        error!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                    }

                    info!("Connection from: {}", peer);
                    let (session, outbound) = lifecycle.open_session();
                    let handler = ConnectionHandler::new(
                        Arc::clone(&lifecycle),
                        session,
                        peer.to_string(),
                        Arc::clone(&config),
                    );
                    tokio::spawn(handler.run(stream, outbound));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    drop(listener);
    closed.send_replace(true);
    info!("Server stopped.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_start_on_ephemeral_port() {
        let server = GameServer::start("127.0.0.1", 0).await.unwrap();
        let port = server.current_port().unwrap();
        assert_ne!(port, 0);
        assert!(server.is_running());

        server.stop().await;
        assert_eq!(server.current_port(), None);
        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = ServerConfig {
            outbound_queue: 0,
            ..ServerConfig::new("127.0.0.1", 0)
        };
        assert!(matches!(
            GameServer::start_with_config(config).await,
            Err(ServerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_goal_event_broadcasts_score() {
        let server = GameServer::start("127.0.0.1", 0).await.unwrap();
        let port = server.current_port().unwrap();

        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        write_half.write_all(b"{\"action\":\"join\"}\n").await.unwrap();

        // join_ack, then the broadcast that follows it
        lines.next_line().await.unwrap().unwrap();
        lines.next_line().await.unwrap().unwrap();

        let score = server.goal_event(Side::Right).await;
        assert_eq!(score, Score { left: 0, right: 1 });

        let line = lines.next_line().await.unwrap().unwrap();
        match shared::ServerMessage::from_line(&line).unwrap() {
            shared::ServerMessage::StateUpdate { game_state } => {
                assert_eq!(game_state.score, score);
                assert_eq!(game_state.puck, shared::Puck::centered());
            }
            other => panic!("expected state_update, got {:?}", other),
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn test_last_session_leaving_stops_server() {
        let server = GameServer::start("127.0.0.1", 0).await.unwrap();
        let port = server.current_port().unwrap();

        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        drop(stream);

        tokio::time::timeout(Duration::from_secs(2), server.stopped())
            .await
            .expect("server should stop after the last session");
        assert_eq!(server.current_port(), None);
        assert_eq!(server.live_sessions(), 0);
    }
}
