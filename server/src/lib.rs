//! # Paddle Arena Server Library
//!
//! This library provides the authoritative session and shared-state core of a
//! realtime two-paddle arcade game. It accepts concurrent client connections,
//! assigns each one a controllable paddle, serializes every mutation of the
//! shared game state and pushes the updated state to every connected client
//! after each mutation.
//!
//! ## Core Responsibilities
//!
//! ### Shared State
//! One store owns players, paddles, the puck and the score. Every operation
//! runs inside a single critical section, so mutations are linearized and a
//! snapshot never observes half of one.
//!
//! ### Paddle Ownership
//! Paddles are free or locked by exactly one player. Grabbing a free paddle
//! locks it and moves the grabber's control onto it; only the holder can
//! release it. Conflicts are reported to the requester, never retried.
//!
//! ### Session Lifecycle
//! Join, per-action authorization and disconnect cleanup. Disconnect removes
//! the player's paddle and every lock it held. When the last session leaves
//! the server stops accepting connections.
//!
//! ### State Broadcasting
//! After every processed message the current snapshot is copied under the
//! state lock, the lock is released and the snapshot is queued for every
//! joined session. Each session has a bounded queue drained by its own
//! writer task, so a slow peer is evicted instead of stalling the game.
//!
//! ## Wire Protocol
//!
//! Newline-delimited JSON over TCP, one object per line. The message types
//! live in the `shared` crate.
//!
//! ## Module Organization
//!
//! - `game`: the `GameStateStore` and its atomic operations
//! - `ownership`: the free/locked paddle state machine and its acks
//! - `session`: join, authorization, disconnect and live-session accounting
//! - `broadcast`: snapshot fan-out
//! - `connection`: the per-connection read loop and dispatch
//! - `outbound`: per-session queues and writer tasks
//! - `network`: listener, accept loop and the `GameServer` handle
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::GameServer;
//! use shared::Side;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = GameServer::start("127.0.0.1", 0).await?;
//!     println!("listening on {:?}", server.current_port());
//!
//!     // Collision detection lives outside this crate and reports goals.
//!     server.goal_event(Side::Left).await;
//!
//!     // Returns once the last player has left.
//!     server.stopped().await;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod error;
pub mod game;
pub mod network;
pub mod outbound;
pub mod ownership;
pub mod session;
pub mod shutdown;

pub use config::ServerConfig;
pub use error::ServerError;
pub use network::GameServer;
