use clap::Parser;
use client::PaddleClient;
use log::info;
use rand::Rng;
use shared::{PaddleId, FIELD_HEIGHT, FIELD_WIDTH};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Number of random moves to send before leaving
    #[arg(short = 'n', long, default_value = "10")]
    moves: u32,

    /// Delay between moves in milliseconds
    #[arg(short = 'i', long, default_value = "500")]
    interval: u64,

    /// Try to take over this paddle after joining
    #[arg(short = 'g', long)]
    grab: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting bot...");
    info!("Connecting to: {}", args.server);

    let mut client = PaddleClient::connect(&args.server).await?;
    let joined = client.join().await?;
    println!(
        "Joined as {} ({} paddles in game)",
        joined.player_id,
        joined.game_state.paddles.len()
    );

    if let Some(target) = args.grab {
        let ack = client.grab_paddle(PaddleId::new(target)).await?;
        println!("Grab result: {:?}", ack);
    }

    let mut rng = rand::thread_rng();
    for _ in 0..args.moves {
        let position = (
            rng.gen_range(0.0..FIELD_WIDTH),
            rng.gen_range(0.0..FIELD_HEIGHT),
        );
        client.update_position(position).await?;
        info!("Moved {:?} to {:?}", client.state().controlling, position);
        sleep(Duration::from_millis(args.interval)).await;
    }

    if let Some(latest) = &client.state().latest {
        println!(
            "Score {}-{}, {} state updates received",
            latest.score.left,
            latest.score.right,
            client.state().updates_received
        );
    }

    client.disconnect().await?;
    Ok(())
}
