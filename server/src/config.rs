//! Startup configuration for the arena.
//!
//! All values are fixed once the server starts. Defaults mirror the
//! constants in `shared` so a client built against the same crate agrees on
//! field size and physics.

use crate::error::ServerError;
use clap::Parser;
use std::time::Duration;

/// Tuning constants for one physics step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsConfig {
    /// Velocity added per tick for each held direction
    pub acceleration: f64,
    pub max_speed: f64,
    /// Velocity multiplier applied every tick, in (0, 1)
    pub friction: f64,
    /// Fraction of velocity kept (and reversed) when hitting a wall
    pub bounce: f64,
    /// Side length of a player's square footprint
    pub player_size: f64,
    pub star_radius: f64,
    /// Speed both players are pushed apart with when they overlap
    pub collision_kick: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            acceleration: shared::ACCELERATION,
            max_speed: shared::MAX_SPEED,
            friction: shared::FRICTION,
            bounce: shared::BOUNCE,
            player_size: shared::PLAYER_SIZE,
            star_radius: shared::STAR_RADIUS,
            collision_kick: shared::BOUNCE * 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub round_duration: Duration,
    pub field_width: f64,
    pub field_height: f64,
    pub max_players: usize,
    /// Simulation ticks per second
    pub tick_rate: u32,
    pub star_margin: f64,
    /// Messages buffered per connection before it is dropped as too slow
    pub outbound_queue_capacity: usize,
    /// Seed for spawn, star and colour randomness; entropy when absent
    pub seed: Option<u64>,
    pub physics: PhysicsConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            round_duration: Duration::from_millis(shared::ROUND_DURATION_MS),
            field_width: shared::FIELD_WIDTH,
            field_height: shared::FIELD_HEIGHT,
            max_players: shared::MAX_PLAYERS,
            tick_rate: shared::TICK_RATE,
            star_margin: shared::STAR_MARGIN,
            outbound_queue_capacity: 64,
            seed: None,
            physics: PhysicsConfig::default(),
        }
    }
}

impl GameConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate as f64)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        let physics = &self.physics;

        if self.tick_rate == 0 {
            return Err(ServerError::Config("tick rate must be positive".into()));
        }
        if self.tick_duration().is_zero() {
            return Err(ServerError::Config(format!(
                "tick rate {} is too high",
                self.tick_rate
            )));
        }
        if self.max_players == 0 {
            return Err(ServerError::Config("max players must be positive".into()));
        }
        let dimensions = [
            ("field width", self.field_width),
            ("field height", self.field_height),
            ("star margin", self.star_margin),
            ("acceleration", physics.acceleration),
            ("max speed", physics.max_speed),
            ("friction", physics.friction),
            ("bounce", physics.bounce),
            ("player size", physics.player_size),
            ("star radius", physics.star_radius),
            ("collision kick", physics.collision_kick),
        ];
        if let Some((name, value)) = dimensions.iter().find(|(_, value)| !value.is_finite()) {
            return Err(ServerError::Config(format!("{} must be finite, got {}", name, value)));
        }
        // init and player_count are queued back to back on connect
        if self.outbound_queue_capacity < 4 {
            return Err(ServerError::Config(
                "outbound queue capacity must be at least 4".into(),
            ));
        }
        if physics.player_size <= 0.0 || physics.star_radius < 0.0 {
            return Err(ServerError::Config(
                "player size and star radius must be positive".into(),
            ));
        }
        if self.field_width <= physics.player_size || self.field_height <= physics.player_size {
            return Err(ServerError::Config(format!(
                "field {}x{} is too small for player size {}",
                self.field_width, self.field_height, physics.player_size
            )));
        }
        if self.star_margin < 0.0
            || self.field_width <= 2.0 * self.star_margin
            || self.field_height <= 2.0 * self.star_margin
        {
            return Err(ServerError::Config(format!(
                "star margin {} leaves no room on a {}x{} field",
                self.star_margin, self.field_width, self.field_height
            )));
        }
        if !(physics.friction > 0.0 && physics.friction < 1.0) {
            return Err(ServerError::Config("friction must be in (0, 1)".into()));
        }
        if physics.max_speed <= 0.0 || physics.acceleration < 0.0 {
            return Err(ServerError::Config(
                "max speed must be positive and acceleration non-negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&physics.bounce) {
            return Err(ServerError::Config("bounce must be in [0, 1]".into()));
        }
        if physics.collision_kick < 0.0 || physics.collision_kick > physics.max_speed {
            return Err(ServerError::Config(
                "collision kick must be in [0, max speed]".into(),
            ));
        }

        Ok(())
    }
}

/// Command line arguments for the server binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct ServerArgs {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value_t = shared::TICK_RATE)]
    pub tick_rate: u32,

    /// Round length in milliseconds
    #[arg(short, long, default_value_t = shared::ROUND_DURATION_MS)]
    pub round_ms: u64,

    /// Maximum concurrent players
    #[arg(short, long, default_value_t = shared::MAX_PLAYERS)]
    pub max_players: usize,

    #[arg(long, default_value_t = shared::FIELD_WIDTH)]
    pub width: f64,

    /// Field height (no short flag to avoid conflict with --help)
    #[arg(long, default_value_t = shared::FIELD_HEIGHT)]
    pub height: f64,

    #[arg(long, default_value_t = shared::ACCELERATION)]
    pub acceleration: f64,

    #[arg(long, default_value_t = shared::MAX_SPEED)]
    pub max_speed: f64,

    #[arg(long, default_value_t = shared::FRICTION)]
    pub friction: f64,

    #[arg(long, default_value_t = shared::BOUNCE)]
    pub bounce: f64,

    #[arg(long, default_value_t = shared::PLAYER_SIZE)]
    pub player_size: f64,

    #[arg(long, default_value_t = shared::STAR_RADIUS)]
    pub star_radius: f64,

    /// Per-connection outbound queue length
    #[arg(long, default_value_t = 64)]
    pub queue_capacity: usize,

    /// Fixed RNG seed for reproducible spawns
    #[arg(long)]
    pub seed: Option<u64>,
}

impl ServerArgs {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn game_config(&self) -> Result<GameConfig, ServerError> {
        let config = GameConfig {
            round_duration: Duration::from_millis(self.round_ms),
            field_width: self.width,
            field_height: self.height,
            max_players: self.max_players,
            tick_rate: self.tick_rate,
            star_margin: shared::STAR_MARGIN,
            outbound_queue_capacity: self.queue_capacity,
            seed: self.seed,
            physics: PhysicsConfig {
                acceleration: self.acceleration,
                max_speed: self.max_speed,
                friction: self.friction,
                bounce: self.bounce,
                player_size: self.player_size,
                star_radius: self.star_radius,
                collision_kick: self.bounce * 2.0,
            },
        };
        config.validate()?;
        Ok(config)
    }
}
