//! # Star Arena Server Library
//!
//! Authoritative server for a real-time arena where up to ten players steer
//! squares around a bounded field, bump into each other and race to pick up
//! a single star. Rounds are timed; the leader at the end of each round is
//! recorded as its winner.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Clients only report which directions they hold. Movement, collisions,
//! pickups and scoring all happen here, at a fixed tick rate, and every
//! client receives the resulting world snapshot after each tick.
//!
//! ### Round Lifecycle
//! A slower round clock checks once per second whether the current round has
//! run out. When it has, the winner is appended to the history, scores are
//! cleared, the star moves and everyone is told who won.
//!
//! ### Connection Management
//! Each WebSocket connection gets a stable identity, a display name and a
//! randomly placed player. Connections beyond the player limit receive a
//! normal close frame explaining that the server is full.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Game Loop
//! One task owns the world and the connection registry. Connection tasks
//! forward events to it over a channel and drain their own bounded outbound
//! queue, so a slow peer never stalls the tick. Peers that fall too far
//! behind are dropped.
//!
//! ### JSON over WebSocket
//! Every message is a JSON object with a `type` tag. See `shared::Packet` for
//! the full set.
//!
//! ## Module Organization
//!
//! - `client_manager`: identities, display names, outbound queues
//! - `config`: startup configuration and command line arguments
//! - `error`: server error type
//! - `game`: the world and its per-tick update
//! - `network`: WebSocket transport and the game loop
//! - `physics`: movement, collisions, pickups and random placement
//! - `round`: scores, leaderboard and winner history
//! - `utils`: timestamps, colours and names
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::GameConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new("127.0.0.1:8080", GameConfig::default()).await?;
//!     let handle = server.handle();
//!
//!     let game_loop = tokio::spawn(server.run());
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown();
//!     game_loop.await??;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod error;
pub mod game;
pub mod network;
pub mod physics;
pub mod round;
pub mod utils;
