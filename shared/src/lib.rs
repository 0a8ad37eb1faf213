//! Wire protocol and world types shared by the arena server and its clients.
//!
//! Every message is a JSON text frame tagged by a `type` field. The server
//! sends `init`, `update`, `round_end` and `player_count`; clients send
//! `input`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const FIELD_WIDTH: f64 = 800.0;
pub const FIELD_HEIGHT: f64 = 600.0;
pub const MAX_PLAYERS: usize = 10;
pub const TICK_RATE: u32 = 30;
pub const ROUND_DURATION_MS: u64 = 60_000;
pub const LEADERBOARD_SIZE: usize = 5;

pub const ACCELERATION: f64 = 0.7;
pub const MAX_SPEED: f64 = 8.0;
pub const FRICTION: f64 = 0.92;
pub const BOUNCE: f64 = 0.8;
pub const PLAYER_SIZE: f64 = 30.0;
pub const STAR_RADIUS: f64 = 15.0;
/// Distance the star keeps from every edge of the field.
pub const STAR_MARGIN: f64 = 25.0;

pub const PLAYER_COLORS: [&str; 5] = ["#FF5252", "#4CAF50", "#2196F3", "#FFC107", "#9C27B0"];

/// Close reason sent when a connection is refused because the arena is full.
pub const SERVER_FULL_REASON: &str = "Server is full (max players reached)";

/// Server-assigned identity of a connected player.
///
/// Serialized as a plain number, but also accepted as a numeric string since
/// JSON object keys (the `players` and `scores` maps) are always strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for PlayerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PlayerIdVisitor;

        impl<'de> Visitor<'de> for PlayerIdVisitor {
            type Value = PlayerId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a player id as a number or numeric string")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<PlayerId, E> {
                u32::try_from(value)
                    .map(PlayerId)
                    .map_err(|_| E::custom(format!("player id {} out of range", value)))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<PlayerId, E> {
                u32::try_from(value)
                    .map(PlayerId)
                    .map_err(|_| E::custom(format!("player id {} out of range", value)))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<PlayerId, E> {
                value
                    .parse::<u32>()
                    .map(PlayerId)
                    .map_err(|_| E::custom(format!("invalid player id {:?}", value)))
            }
        }

        deserializer.deserialize_any(PlayerIdVisitor)
    }
}

/// Directions a client is currently holding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

/// A player as it exists in the world. Position is the top-left corner of
/// the player's square footprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub color: String,
    pub name: String,
    pub input: InputState,
}

impl Player {
    pub fn new(x: f64, y: f64, color: String, name: String) -> Self {
        Self {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            color,
            name,
            input: InputState::default(),
        }
    }

    pub fn center(&self, size: f64) -> (f64, f64) {
        (self.x + size / 2.0, self.y + size / 2.0)
    }

    pub fn speed(&self) -> f64 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }
}

/// The single pickup target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Star {
    pub x: f64,
    pub y: f64,
}

/// One leaderboard row, encoded as a `[playerId, score]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry(pub PlayerId, pub u32);

impl LeaderboardEntry {
    pub fn player_id(&self) -> PlayerId {
        self.0
    }

    pub fn score(&self) -> u32 {
        self.1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerRecord {
    pub round: u32,
    pub player_id: PlayerId,
    pub score: u32,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSnapshot {
    pub number: u32,
    /// Milliseconds until the round ends, never negative.
    pub time_left: u64,
    pub scores: BTreeMap<PlayerId, u32>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub previous_winners: Vec<WinnerRecord>,
}

/// Full world state as broadcast to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub players: BTreeMap<PlayerId, Player>,
    pub star: Star,
    pub round: RoundSnapshot,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Packet {
    #[serde(rename_all = "camelCase")]
    Init {
        player_id: PlayerId,
        game_state: GameSnapshot,
        player_color: String,
        player_name: String,
    },
    #[serde(rename_all = "camelCase")]
    Update { game_state: GameSnapshot },
    RoundEnd {
        round: u32,
        winner: Option<String>,
    },
    PlayerCount { count: usize },
    #[serde(rename_all = "camelCase")]
    Input {
        player_id: PlayerId,
        input: InputState,
    },
}

impl Packet {
    /// The wire `type` tag of this packet.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Init { .. } => "init",
            Packet::Update { .. } => "update",
            Packet::RoundEnd { .. } => "round_end",
            Packet::PlayerCount { .. } => "player_count",
            Packet::Input { .. } => "input",
        }
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a text frame. Unknown `type` values are reported as errors so
    /// the caller can drop them.
    pub fn decode(text: &str) -> Result<Packet, CodecError> {
        Ok(serde_json::from_str(text)?)
    }
}
