//! Integration tests for the arena server
//!
//! These tests run a real server on an ephemeral port and talk to it over
//! WebSocket the way a browser client would.

use futures_util::{SinkExt, StreamExt};
use server::config::GameConfig;
use server::game::GameState;
use server::network::{Server, ServerHandle};
use shared::{InputState, Packet, PlayerId, SERVER_FULL_REASON};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    handle: ServerHandle,
    game_loop: JoinHandle<Result<(), server::error::ServerError>>,
}

async fn start_server(config: GameConfig) -> TestServer {
    let config = GameConfig {
        seed: Some(99),
        ..config
    };
    let server = Server::new("127.0.0.1:0", config)
        .await
        .expect("Failed to start server");
    let addr = server.local_addr();
    let handle = server.handle();
    let game_loop = tokio::spawn(server.run());

    TestServer {
        addr,
        handle,
        game_loop,
    }
}

async fn connect(addr: SocketAddr) -> Ws {
    let (ws, _) = connect_async(format!("ws://{}", addr))
        .await
        .expect("Failed to connect");
    ws
}

/// Next frame of any kind, failing the test if none arrives in time
async fn next_message(ws: &mut Ws) -> Message {
    timeout(WAIT, ws.next())
        .await
        .expect("Timed out waiting for a message")
        .expect("Connection ended")
        .expect("WebSocket error")
}

async fn next_packet(ws: &mut Ws) -> Packet {
    loop {
        match next_message(ws).await {
            Message::Text(text) => return Packet::decode(&text).expect("Invalid packet"),
            Message::Close(frame) => panic!("Unexpected close: {:?}", frame),
            _ => continue,
        }
    }
}

/// Reads packets until one satisfies the predicate
async fn wait_for<F>(ws: &mut Ws, mut predicate: F) -> Packet
where
    F: FnMut(&Packet) -> bool,
{
    loop {
        let packet = next_packet(ws).await;
        if predicate(&packet) {
            return packet;
        }
    }
}

async fn join(ws: &mut Ws) -> PlayerId {
    match wait_for(ws, |p| matches!(p, Packet::Init { .. })).await {
        Packet::Init { player_id, .. } => player_id,
        _ => unreachable!(),
    }
}

async fn send_input(ws: &mut Ws, player_id: PlayerId, input: InputState) {
    let packet = Packet::Input { player_id, input };
    ws.send(Message::text(packet.encode().unwrap()))
        .await
        .expect("Failed to send input");
}

/// CONNECTION LIFECYCLE TESTS
mod connection_tests {
    use super::*;

    /// A new client hears the player count first, then its own init
    #[tokio::test]
    async fn join_sends_count_then_init() {
        let server = start_server(GameConfig::default()).await;
        let mut ws = connect(server.addr).await;

        assert_eq!(next_packet(&mut ws).await, Packet::PlayerCount { count: 1 });

        match next_packet(&mut ws).await {
            Packet::Init {
                player_id,
                game_state,
                player_color,
                player_name,
            } => {
                assert_eq!(player_id, PlayerId(1));
                assert_eq!(player_name, "Player1");
                assert!(shared::PLAYER_COLORS.contains(&player_color.as_str()));
                assert_eq!(game_state.players[&player_id].color, player_color);
                assert_eq!(game_state.round.number, 1);
                assert!(game_state.round.previous_winners.is_empty());
            }
            other => panic!("Expected init, got {:?}", other),
        }

        server.handle.shutdown();
    }

    /// Every connected client is told when someone joins
    #[tokio::test]
    async fn second_join_updates_everyone() {
        let server = start_server(GameConfig::default()).await;
        let mut first = connect(server.addr).await;
        let first_id = join(&mut first).await;

        let mut second = connect(server.addr).await;
        let second_id = join(&mut second).await;

        assert_ne!(first_id, second_id);
        wait_for(&mut first, |p| *p == Packet::PlayerCount { count: 2 }).await;

        server.handle.shutdown();
    }

    /// A connection over the limit gets a normal close frame and nothing else
    #[tokio::test]
    async fn full_server_rejects_with_close_frame() {
        let server = start_server(GameConfig {
            max_players: 1,
            ..GameConfig::default()
        })
        .await;
        let mut first = connect(server.addr).await;
        join(&mut first).await;

        let mut rejected = connect(server.addr).await;
        match next_message(&mut rejected).await {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, CloseCode::Normal);
                assert_eq!(frame.reason.as_str(), SERVER_FULL_REASON);
            }
            other => panic!("Expected close frame, got {:?}", other),
        }

        // The admitted player still sees a one-player world
        let update = wait_for(&mut first, |p| matches!(p, Packet::Update { .. })).await;
        if let Packet::Update { game_state } = update {
            assert_eq!(game_state.players.len(), 1);
        }

        server.handle.shutdown();
    }

    /// Leaving removes the player and lowers the count for everyone else
    #[tokio::test]
    async fn disconnect_broadcasts_new_count() {
        let server = start_server(GameConfig::default()).await;
        let mut first = connect(server.addr).await;
        let first_id = join(&mut first).await;
        let mut second = connect(server.addr).await;
        join(&mut second).await;

        first.close(None).await.expect("Failed to close");

        wait_for(&mut second, |p| *p == Packet::PlayerCount { count: 1 }).await;
        let update = wait_for(&mut second, |p| matches!(p, Packet::Update { .. })).await;
        if let Packet::Update { game_state } = update {
            assert!(!game_state.players.contains_key(&first_id));
            assert!(!game_state.round.scores.contains_key(&first_id));
        }

        server.handle.shutdown();
    }

    /// Shutting down closes every connection normally
    #[tokio::test]
    async fn shutdown_closes_connections() {
        let server = start_server(GameConfig::default()).await;
        let mut ws = connect(server.addr).await;
        join(&mut ws).await;

        assert!(server.handle.shutdown());

        let frame = loop {
            match next_message(&mut ws).await {
                Message::Close(frame) => break frame,
                _ => continue,
            }
        };
        assert_eq!(frame.map(|f| f.code), Some(CloseCode::Normal));

        let result = timeout(WAIT, server.game_loop)
            .await
            .expect("Game loop did not stop");
        tokio_test::assert_ok!(result.expect("Game loop panicked"));
    }
}

/// GAMEPLAY TESTS
mod gameplay_tests {
    use super::*;

    /// Held input shows up as velocity in later snapshots
    #[tokio::test]
    async fn input_changes_velocity() {
        let server = start_server(GameConfig::default()).await;
        let mut ws = connect(server.addr).await;
        let player_id = join(&mut ws).await;

        send_input(
            &mut ws,
            player_id,
            InputState {
                right: true,
                ..InputState::default()
            },
        )
        .await;

        wait_for(&mut ws, |p| match p {
            Packet::Update { game_state } => game_state.players[&player_id].vx > 0.0,
            _ => false,
        })
        .await;

        server.handle.shutdown();
    }

    /// Browser clients may send the id as a string
    #[tokio::test]
    async fn input_with_string_player_id_is_accepted() {
        let server = start_server(GameConfig::default()).await;
        let mut ws = connect(server.addr).await;
        let player_id = join(&mut ws).await;

        let raw = serde_json::json!({
            "type": "input",
            "playerId": player_id.0.to_string(),
            "input": { "down": true },
        });
        ws.send(Message::text(raw.to_string())).await.unwrap();

        wait_for(&mut ws, |p| match p {
            Packet::Update { game_state } => game_state.players[&player_id].vy > 0.0,
            _ => false,
        })
        .await;

        server.handle.shutdown();
    }

    /// Garbage from a client is ignored and the connection stays up
    #[tokio::test]
    async fn malformed_messages_are_ignored() {
        let server = start_server(GameConfig::default()).await;
        let mut ws = connect(server.addr).await;
        join(&mut ws).await;

        for raw in ["not json", "{\"type\":\"teleport\"}", "{\"type\":\"input\"}"] {
            ws.send(Message::text(raw.to_string())).await.unwrap();
        }
        ws.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();

        let update = wait_for(&mut ws, |p| matches!(p, Packet::Update { .. })).await;
        if let Packet::Update { game_state } = update {
            assert_eq!(game_state.players.len(), 1);
        }

        server.handle.shutdown();
    }

    /// Updates arrive at roughly the configured tick rate
    #[tokio::test]
    async fn updates_follow_tick_rate() {
        let server = start_server(GameConfig::default()).await;
        let mut ws = connect(server.addr).await;
        join(&mut ws).await;

        let start = Instant::now();
        for _ in 0..15 {
            wait_for(&mut ws, |p| matches!(p, Packet::Update { .. })).await;
        }
        let elapsed = start.elapsed();

        // 15 ticks at 30 Hz is half a second
        assert!(elapsed >= Duration::from_millis(350), "too fast: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(3), "too slow: {:?}", elapsed);

        server.handle.shutdown();
    }

    /// A zero-length round ends at the first round clock check
    #[tokio::test]
    async fn zero_length_round_announces_winner() {
        let server = start_server(GameConfig {
            round_duration: Duration::ZERO,
            ..GameConfig::default()
        })
        .await;
        let mut ws = connect(server.addr).await;
        let player_id = join(&mut ws).await;

        // Round 1 normally ends after the join, but a slow connect may miss it
        let round_end = wait_for(&mut ws, |p| {
            matches!(p, Packet::RoundEnd { winner: Some(_), .. })
        })
        .await;
        let ended = match round_end {
            Packet::RoundEnd { round, winner } => {
                assert_eq!(winner.as_deref(), Some("Player1"));
                round
            }
            _ => unreachable!(),
        };

        let update = wait_for(&mut ws, |p| matches!(p, Packet::Update { .. })).await;
        if let Packet::Update { game_state } = update {
            assert!(game_state.round.number > ended);
            let record = game_state
                .round
                .previous_winners
                .iter()
                .find(|record| record.round == ended)
                .expect("winner recorded");
            assert_eq!(record.player_id, player_id);
            assert_eq!(record.score, 0);
        }

        server.handle.shutdown();
    }
}

/// SIMULATION PROPERTY TESTS
mod simulation_tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_input(rng: &mut StdRng) -> InputState {
        InputState {
            up: rng.gen(),
            down: rng.gen(),
            left: rng.gen(),
            right: rng.gen(),
        }
    }

    fn crowded_state(players: u32) -> GameState {
        let config = GameConfig {
            seed: Some(7),
            ..GameConfig::default()
        };
        let mut state = GameState::new(config, Instant::now());
        for id in 1..=players {
            state.add_player(PlayerId(id), format!("Player{}", id));
        }
        state
    }

    /// A coasting player slows geometrically and travels the summed distance
    #[test]
    fn coasting_player_decays_by_friction() {
        let mut state = crowded_state(1);
        let friction = state.config().physics.friction;
        {
            let player = state.players.get_mut(&PlayerId(1)).unwrap();
            player.x = 400.0;
            player.y = 300.0;
            player.vx = 4.0;
            player.vy = 0.0;
            player.input = InputState::default();
        }

        let mut expected_x = 400.0;
        let mut expected_vx = 4.0;
        for _ in 0..10 {
            state.update_physics();
            expected_vx *= friction;
            expected_x += expected_vx;
        }

        let player = &state.players[&PlayerId(1)];
        assert_approx_eq!(player.vx, 4.0 * friction.powi(10), 1e-9);
        assert_approx_eq!(player.x, expected_x, 1e-9);
        assert_approx_eq!(player.y, 300.0, 1e-9);
        assert_approx_eq!(player.vy, 0.0, 1e-12);
    }

    /// Positions stay on the field and speeds stay capped under random input
    #[test]
    fn players_stay_in_bounds_and_under_speed_cap() {
        let mut state = crowded_state(10);
        let mut rng = StdRng::seed_from_u64(42);
        let size = state.config().physics.player_size;
        let max_speed = state.config().physics.max_speed;

        for tick in 0..3_000 {
            if tick % 15 == 0 {
                for id in 1..=10 {
                    state.update_player_input(PlayerId(id), random_input(&mut rng));
                }
            }

            state.update_physics();

            for (id, player) in &state.players {
                assert!(
                    player.x >= 0.0 && player.x <= shared::FIELD_WIDTH - size,
                    "player {} x out of bounds at tick {}: {}",
                    id,
                    tick,
                    player.x
                );
                assert!(
                    player.y >= 0.0 && player.y <= shared::FIELD_HEIGHT - size,
                    "player {} y out of bounds at tick {}: {}",
                    id,
                    tick,
                    player.y
                );
                assert!(player.speed() <= max_speed + 1e-9);
            }
            assert!(state.star.x >= shared::STAR_MARGIN);
            assert!(state.star.x <= shared::FIELD_WIDTH - shared::STAR_MARGIN);
            assert!(state.star.y >= shared::STAR_MARGIN);
            assert!(state.star.y <= shared::FIELD_HEIGHT - shared::STAR_MARGIN);
        }
    }

    /// Scores only ever grow by one pickup per tick and the leaderboard agrees
    #[test]
    fn scores_and_leaderboard_stay_consistent() {
        let mut state = crowded_state(8);
        let mut rng = StdRng::seed_from_u64(1);
        let mut total = 0;

        for tick in 0..3_000 {
            if tick % 10 == 0 {
                for id in 1..=8 {
                    state.update_player_input(PlayerId(id), random_input(&mut rng));
                }
            }

            if state.update_physics().is_some() {
                total += 1;
            }

            let scores = state.round.scores();
            assert_eq!(scores.values().sum::<u32>(), total);

            let board = state.round.leaderboard();
            assert!(board.len() <= shared::LEADERBOARD_SIZE);
            for pair in board.windows(2) {
                assert!(
                    pair[0].score() > pair[1].score()
                        || (pair[0].score() == pair[1].score()
                            && pair[0].player_id() < pair[1].player_id())
                );
            }
            for entry in board {
                assert_eq!(scores[&entry.player_id()], entry.score());
            }
        }
    }
}
