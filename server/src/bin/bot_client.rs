//! Headless bot that joins an arena server and wanders around at random.
//!
//! Useful for filling a local server with players and watching the logs.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use rand::Rng;
use shared::{InputState, Packet, PlayerId};
use std::time::Duration;
use tokio::time::{interval, sleep_until, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server URL to connect to
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// How often the bot changes direction, in milliseconds
    #[arg(short = 'i', long, default_value = "500")]
    input_interval: u64,

    /// Seconds to stay connected (0 runs until the server closes)
    #[arg(short = 'd', long, default_value = "30")]
    duration: u64,
}

fn random_input<R: Rng>(rng: &mut R) -> InputState {
    InputState {
        up: rng.gen_bool(0.3),
        down: rng.gen_bool(0.3),
        left: rng.gen_bool(0.3),
        right: rng.gen_bool(0.3),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    info!("Connecting to {}", args.server);

    let (ws_stream, _) = connect_async(args.server.as_str()).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let mut rng = rand::thread_rng();
    let mut player_id: Option<PlayerId> = None;
    let mut updates: u64 = 0;

    let mut input_timer = interval(Duration::from_millis(args.input_interval.max(1)));
    let deadline = if args.duration > 0 {
        Instant::now() + Duration::from_secs(args.duration)
    } else {
        Instant::now() + Duration::from_secs(u32::MAX as u64)
    };

    loop {
        tokio::select! {
            message = ws_receiver.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        match frame {
                            Some(frame) => info!("Server closed connection: {}", frame.reason.as_str()),
                            None => info!("Server closed connection"),
                        }
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                match Packet::decode(&text) {
                    Ok(Packet::Init { player_id: id, player_name, player_color, .. }) => {
                        info!("Joined as {} ({}, {})", player_name, id, player_color);
                        player_id = Some(id);
                    }
                    Ok(Packet::Update { game_state }) => {
                        updates += 1;
                        if updates % 300 == 0 {
                            let score = player_id
                                .and_then(|id| game_state.round.scores.get(&id).copied())
                                .unwrap_or(0);
                            info!(
                                "Round {}: {} players, my score {}, {} ms left",
                                game_state.round.number,
                                game_state.players.len(),
                                score,
                                game_state.round.time_left
                            );
                        }
                    }
                    Ok(Packet::RoundEnd { round, winner }) => {
                        info!("Round {} won by {}", round, winner.as_deref().unwrap_or("nobody"));
                    }
                    Ok(Packet::PlayerCount { count }) => info!("{} players connected", count),
                    Ok(Packet::Input { .. }) => {}
                    Err(e) => warn!("Failed to decode server message: {}", e),
                }
            }

            _ = input_timer.tick() => {
                let Some(id) = player_id else { continue };
                let input = Packet::Input { player_id: id, input: random_input(&mut rng) };
                ws_sender.send(Message::text(input.encode()?)).await?;
            }

            _ = sleep_until(deadline) => {
                info!("Bot finished after {}s", args.duration);
                ws_sender.close().await?;
                break;
            }
        }
    }

    Ok(())
}
