//! # Paddle Arena Client Library
//!
//! Headless client for the paddle arena server. It speaks the newline-delimited
//! JSON protocol from the `shared` crate and keeps a local mirror of the most
//! recent authoritative state. There is no rendering or input capture here;
//! the library is used by the scripted bot binary and by the integration tests.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! Local view of the session:
//! - Player and paddle ids handed out on join
//! - Which paddle this client currently steers
//! - Latest snapshot received from the server
//!
//! ### Network Module (`network`)
//! TCP connection handling:
//! - Framing and message encoding
//! - Request helpers that wait for the matching acknowledgement
//! - State updates folded into the local game view while waiting
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::PaddleClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = PaddleClient::connect("127.0.0.1:8080").await?;
//!     let joined = client.join().await?;
//!     println!("playing as {}", joined.player_id);
//!
//!     client.update_position((100.0, 360.0)).await?;
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;

pub use network::{ClientError, PaddleClient};
