//! Integration tests for the paddle arena server and client
//!
//! These tests run a real `GameServer` on an ephemeral port and drive it
//! through `PaddleClient`s over TCP.

use assert_approx_eq::assert_approx_eq;
use client::PaddleClient;
use server::{GameServer, ServerConfig};
use shared::{
    AckStatus, GameSnapshot, PaddleId, Puck, ServerMessage, Side, FIELD_HEIGHT, FIELD_WIDTH,
};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_test::assert_ok;

const STEP: Duration = Duration::from_secs(5);

async fn start_server() -> (GameServer, String) {
    let server = GameServer::start_with_config(ServerConfig::new("127.0.0.1", 0))
        .await
        .expect("server should start");
    let port = server.current_port().expect("server should be listening");
    (server, format!("127.0.0.1:{}", port))
}

async fn within<T>(future: impl Future<Output = T>) -> T {
    timeout(STEP, future).await.expect("step timed out")
}

/// Waits for a broadcast satisfying `check`.
async fn state_where<F>(client: &mut PaddleClient, mut check: F) -> GameSnapshot
where
    F: FnMut(&GameSnapshot) -> bool,
{
    within(async {
        loop {
            let state = client.recv_state().await.expect("state update");
            if check(&state) {
                return state;
            }
        }
    })
    .await
}

/// SESSION LIFECYCLE TESTS
mod session_tests {
    use super::*;

    /// Two sessions join in order; A takes over B's paddle, B cannot grab it back.
    #[tokio::test]
    async fn grab_transfers_control_between_sessions() {
        let (server, addr) = start_server().await;

        let mut a = PaddleClient::connect(&addr).await.unwrap();
        let joined_a = within(a.join()).await.unwrap();
        assert_eq!(joined_a.paddle_id, PaddleId::home_of(&joined_a.player_id));

        let mut b = PaddleClient::connect(&addr).await.unwrap();
        let joined_b = within(b.join()).await.unwrap();
        assert!(joined_b.game_state.paddles.contains_key(&joined_a.paddle_id));
        assert!(joined_b.game_state.paddles.contains_key(&joined_b.paddle_id));

        let ack = within(a.grab_paddle(joined_b.paddle_id.clone())).await.unwrap();
        assert_eq!(
            ack,
            ServerMessage::GrabAck {
                status: AckStatus::Success,
                paddle_id: joined_b.paddle_id.clone(),
                reason: None,
            }
        );
        assert_eq!(a.state().controlling, Some(joined_b.paddle_id.clone()));

        let ack = within(b.grab_paddle(joined_b.paddle_id.clone())).await.unwrap();
        match ack {
            ServerMessage::GrabAck { status, reason, .. } => {
                assert_eq!(status, AckStatus::Failed);
                assert_eq!(reason.as_deref(), Some("paddle already locked"));
            }
            other => panic!("expected grab_ack, got {:?}", other),
        }

        // A's moves now land on B's paddle.
        within(a.update_position((200.0, 100.0))).await.unwrap();
        let state = state_where(&mut b, |s| {
            s.paddles[&joined_b.paddle_id].position == (200.0, 100.0)
        })
        .await;
        assert_eq!(
            state.paddles[&joined_b.paddle_id].locked_by,
            Some(joined_a.player_id.clone())
        );

        server.stop().await;
    }

    /// An action for an unknown player is rejected and leaves the state alone.
    #[tokio::test]
    async fn unknown_player_update_is_rejected() {
        let (server, addr) = start_server().await;

        let mut a = PaddleClient::connect(&addr).await.unwrap();
        within(a.join()).await.unwrap();
        let before = server.snapshot().await;

        a.send_raw("{\"action\":\"update_position\",\"player_id\":\"x\",\"position\":[5,5]}\n")
            .await
            .unwrap();
        let reply = within(a.recv_reply()).await.unwrap();
        assert_eq!(reply, ServerMessage::error("Invalid or missing player_id"));

        assert_eq!(server.snapshot().await, before);
        server.stop().await;
    }

    /// Acting on another session's player id counts as an invalid session.
    #[tokio::test]
    async fn cannot_act_for_another_session() {
        let (server, addr) = start_server().await;

        let mut a = PaddleClient::connect(&addr).await.unwrap();
        let joined_a = within(a.join()).await.unwrap();
        let mut b = PaddleClient::connect(&addr).await.unwrap();
        within(b.join()).await.unwrap();

        let forged = format!(
            "{{\"action\":\"update_position\",\"player_id\":\"{}\",\"position\":[9,9]}}\n",
            joined_a.player_id
        );
        b.send_raw(&forged).await.unwrap();
        let reply = within(b.recv_reply()).await.unwrap();
        assert!(matches!(reply, ServerMessage::Error { .. }));

        let snapshot = server.snapshot().await;
        assert_eq!(snapshot.paddles[&joined_a.paddle_id].position, (0.0, 0.0));
        server.stop().await;
    }

    /// Joining twice on one connection keeps the original binding.
    #[tokio::test]
    async fn rejoin_returns_existing_binding() {
        let (server, addr) = start_server().await;

        let mut a = PaddleClient::connect(&addr).await.unwrap();
        let first = within(a.join()).await.unwrap();
        let second = within(a.join_as(None)).await.unwrap();

        assert_eq!(first.player_id, second.player_id);
        assert_eq!(first.paddle_id, second.paddle_id);
        assert_eq!(server.snapshot().await.paddles.len(), 1);
        server.stop().await;
    }

    /// Malformed input is answered with an error and the session carries on.
    #[tokio::test]
    async fn malformed_message_is_not_fatal() {
        let (server, addr) = start_server().await;

        let mut a = PaddleClient::connect(&addr).await.unwrap();
        a.send_raw("this is not json\n").await.unwrap();
        match within(a.recv_reply()).await.unwrap() {
            ServerMessage::Error { message } => assert!(message.starts_with("malformed message")),
            other => panic!("expected error, got {:?}", other),
        }

        let joined = within(a.join()).await.unwrap();
        assert!(joined.game_state.paddles.contains_key(&joined.paddle_id));
        server.stop().await;
    }
}

/// DISCONNECT AND SHUTDOWN TESTS
mod disconnect_tests {
    use super::*;

    /// A departing player's paddle disappears and its locks are released.
    #[tokio::test]
    async fn disconnect_removes_paddle_and_releases_locks() {
        let (server, addr) = start_server().await;

        let mut a = PaddleClient::connect(&addr).await.unwrap();
        let joined_a = within(a.join()).await.unwrap();
        let mut b = PaddleClient::connect(&addr).await.unwrap();
        let joined_b = within(b.join()).await.unwrap();

        let ack = within(b.grab_paddle(joined_a.paddle_id.clone())).await.unwrap();
        assert!(matches!(
            ack,
            ServerMessage::GrabAck {
                status: AckStatus::Success,
                ..
            }
        ));

        assert_ok!(within(b.disconnect()).await);

        let state = state_where(&mut a, |s| !s.paddles.contains_key(&joined_b.paddle_id)).await;
        assert!(state
            .paddles
            .values()
            .all(|paddle| paddle.locked_by.as_ref() != Some(&joined_b.player_id)));
        assert_eq!(state.paddles[&joined_a.paddle_id].locked_by, None);

        // The freed paddle can be grabbed again.
        let ack = within(a.grab_paddle(joined_a.paddle_id.clone())).await.unwrap();
        assert!(matches!(
            ack,
            ServerMessage::GrabAck {
                status: AckStatus::Success,
                ..
            }
        ));
        server.stop().await;
    }

    /// Dropping the socket without a goodbye runs the same cleanup.
    #[tokio::test]
    async fn dropped_connection_is_cleaned_up() {
        let (server, addr) = start_server().await;

        let mut a = PaddleClient::connect(&addr).await.unwrap();
        within(a.join()).await.unwrap();
        let mut b = PaddleClient::connect(&addr).await.unwrap();
        let joined_b = within(b.join()).await.unwrap();
        drop(b);

        state_where(&mut a, |s| !s.paddles.contains_key(&joined_b.paddle_id)).await;
        assert_eq!(server.live_sessions(), 1);
        server.stop().await;
    }

    /// The last session leaving closes the listener for good.
    #[tokio::test]
    async fn last_disconnect_stops_server() {
        let (server, addr) = start_server().await;

        let mut a = PaddleClient::connect(&addr).await.unwrap();
        within(a.join()).await.unwrap();
        let mut b = PaddleClient::connect(&addr).await.unwrap();
        within(b.join()).await.unwrap();

        assert_ok!(within(a.disconnect()).await);
        assert!(server.is_running());

        assert_ok!(within(b.disconnect()).await);
        within(server.stopped()).await;

        assert_eq!(server.current_port(), None);
        assert!(TcpStream::connect(&addr).await.is_err());
    }
}

/// GAME STATE TESTS
mod game_state_tests {
    use super::*;

    /// Goals only ever raise the score and always re-center the puck.
    #[tokio::test]
    async fn goal_event_updates_every_client() {
        let (server, addr) = start_server().await;

        let mut a = PaddleClient::connect(&addr).await.unwrap();
        within(a.join()).await.unwrap();

        let mut last = (0, 0);
        for side in [Side::Left, Side::Right, Side::Left] {
            let score = server.goal_event(side).await;
            assert!(score.left >= last.0 && score.right >= last.1);
            last = (score.left, score.right);

            let state = state_where(&mut a, |s| s.score == score).await;
            assert_eq!(state.puck, Puck::centered());
        }
        assert_eq!(last, (2, 1));
        server.stop().await;
    }

    /// Every snapshot lists every live paddle along with the puck and score.
    #[tokio::test]
    async fn snapshots_are_structurally_complete() {
        let (server, addr) = start_server().await;

        let mut clients = Vec::new();
        let mut paddles = Vec::new();
        for _ in 0..3 {
            let mut client = PaddleClient::connect(&addr).await.unwrap();
            let joined = within(client.join()).await.unwrap();
            paddles.push(joined.paddle_id);
            clients.push(client);
        }

        let state = state_where(&mut clients[0], |s| s.paddles.len() == 3).await;
        for paddle in &paddles {
            let view = &state.paddles[paddle];
            assert_eq!(view.velocity, (0.0, 0.0));
        }
        assert_approx_eq!(state.puck.position.0, FIELD_WIDTH / 2.0);
        assert_approx_eq!(state.puck.position.1, FIELD_HEIGHT / 2.0);

        let raw: serde_json::Value = serde_json::to_value(ServerMessage::StateUpdate {
            game_state: state,
        })
        .unwrap();
        assert!(raw["game_state"]["puck"]["position"].is_array());
        assert!(raw["game_state"]["score"]["left"].is_u64());
        assert_eq!(raw["game_state"]["paddles"].as_object().unwrap().len(), 3);
        server.stop().await;
    }

    /// Many sessions racing for one paddle produce exactly one winner.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_grabs_have_one_winner() {
        let (server, addr) = start_server().await;

        let mut owner = PaddleClient::connect(&addr).await.unwrap();
        let target = within(owner.join()).await.unwrap().paddle_id;

        let mut contenders = Vec::new();
        for _ in 0..8 {
            let mut client = PaddleClient::connect(&addr).await.unwrap();
            within(client.join()).await.unwrap();
            contenders.push(client);
        }

        let handles: Vec<_> = contenders
            .into_iter()
            .map(|mut client| {
                let target = target.clone();
                tokio::spawn(async move {
                    let ack = within(client.grab_paddle(target)).await.unwrap();
                    (ack, client)
                })
            })
            .collect();

        let mut wins = 0;
        let mut clients = Vec::new();
        for handle in handles {
            let (ack, client) = handle.await.unwrap();
            match ack {
                ServerMessage::GrabAck {
                    status: AckStatus::Success,
                    ..
                } => wins += 1,
                ServerMessage::GrabAck {
                    status: AckStatus::Failed,
                    reason,
                    ..
                } => assert_eq!(reason.as_deref(), Some("paddle already locked")),
                other => panic!("expected grab_ack, got {:?}", other),
            }
            clients.push(client);
        }
        assert_eq!(wins, 1);

        let snapshot = server.snapshot().await;
        assert!(snapshot.paddles[&target].locked_by.is_some());
        server.stop().await;
    }
}
