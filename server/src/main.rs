use clap::Parser;
use log::info;
use server::{GameServer, ServerConfig};
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, starts the game server and runs until the
/// last player leaves or Ctrl+C is pressed.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[command(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[arg(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on (0 picks a free port)
        #[arg(short, long, default_value = "0")]
        port: u16,
        /// Messages buffered per client before it is dropped
        #[arg(short, long, default_value = "64")]
        queue: usize,
        /// Longest accepted message in bytes
        #[arg(short, long, default_value = "2048")]
        max_message_bytes: usize,
        /// Disconnect clients silent for this many seconds (0 disables)
        #[arg(short, long, default_value = "0")]
        idle_timeout_secs: u64,
    }

    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        outbound_queue: args.queue,
        max_message_bytes: args.max_message_bytes,
        idle_timeout: (args.idle_timeout_secs > 0)
            .then(|| Duration::from_secs(args.idle_timeout_secs)),
    };

    let server = GameServer::start_with_config(config).await?;
    if let Some(port) = server.current_port() {
        println!("Server listening on port {}", port);
    }

    // Handle shutdown gracefully
    tokio::select! {
        _ = server.stopped() => {
            info!("All players left");
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
            server.stop().await;
        }
    }

    Ok(())
}
