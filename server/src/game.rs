//! The authoritative world and its per-tick update.

use crate::config::GameConfig;
use crate::physics;
use crate::round::{RoundManager, RoundOutcome};
use crate::utils::random_color;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{GameSnapshot, InputState, Player, PlayerId, Star};
use std::collections::BTreeMap;
use tokio::time::Instant;

/// A finished round as announced to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSummary {
    pub round: u32,
    /// Display name of the winner, if anyone is on the leaderboard
    pub winner_name: Option<String>,
}

/// The authoritative world: players, the star and the live round.
#[derive(Debug)]
pub struct GameState {
    pub tick: u64,
    pub players: BTreeMap<PlayerId, Player>,
    pub star: Star,
    pub round: RoundManager,
    config: GameConfig,
    rng: StdRng,
}

impl GameState {
    pub fn new(config: GameConfig, now: Instant) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let star = physics::random_star(
            &mut rng,
            config.field_width,
            config.field_height,
            config.star_margin,
        );

        Self {
            tick: 0,
            players: BTreeMap::new(),
            star,
            round: RoundManager::new(config.round_duration, now),
            config,
            rng,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Spawns a player at a random position with a random colour and a zero
    /// score entry. Returns the assigned colour.
    pub fn add_player(&mut self, player_id: PlayerId, name: String) -> String {
        let (x, y) = physics::random_spawn(
            &mut self.rng,
            self.config.field_width,
            self.config.field_height,
            self.config.physics.player_size,
        );
        let color = random_color(&mut self.rng);

        info!(
            "Added player {} ({}, {}) at ({:.1}, {:.1})",
            player_id, name, color, x, y
        );
        self.players
            .insert(player_id, Player::new(x, y, color.clone(), name));
        self.round.add_player(player_id);
        color
    }

    /// Drops the player and its score. Safe to call for unknown ids.
    pub fn remove_player(&mut self, player_id: &PlayerId) -> bool {
        let removed = self.players.remove(player_id).is_some();
        self.round.remove_player(player_id);
        if removed {
            info!("Removed player {}", player_id);
        }
        removed
    }

    /// Replaces a player's held directions. Unknown ids are ignored.
    pub fn update_player_input(&mut self, player_id: PlayerId, input: InputState) -> bool {
        match self.players.get_mut(&player_id) {
            Some(player) => {
                player.input = input;
                true
            }
            None => false,
        }
    }

    pub fn regenerate_star(&mut self) {
        self.star = physics::random_star(
            &mut self.rng,
            self.config.field_width,
            self.config.field_height,
            self.config.star_margin,
        );
    }

    /// Runs one physics step over every player and resolves the star pickup.
    /// Returns the player who scored this tick, if any.
    pub fn update_physics(&mut self) -> Option<PlayerId> {
        self.tick += 1;
        let tuning = self.config.physics;

        for player in self.players.values_mut() {
            physics::integrate(
                player,
                &tuning,
                self.config.field_width,
                self.config.field_height,
            );
        }

        let collisions = physics::resolve_collisions(&mut self.players, &tuning);
        if collisions > 0 {
            debug!("Tick {}: {} collisions", self.tick, collisions);
        }

        let scorer = physics::find_pickup(&self.players, &self.star, &tuning)?;
        let score = self.round.award_point(scorer);
        self.regenerate_star();
        debug!("Player {} picked up the star, score {}", scorer, score);
        Some(scorer)
    }

    /// Round clock check. On round end the star moves and the outcome is
    /// returned for broadcasting.
    pub fn check_round(&mut self, now: Instant) -> Option<RoundSummary> {
        let outcome = self.round.tick(now)?;
        Some(self.finish_round(outcome))
    }

    fn finish_round(&mut self, outcome: RoundOutcome) -> RoundSummary {
        self.regenerate_star();
        RoundSummary {
            round: outcome.round,
            winner_name: outcome
                .winner
                .and_then(|winner| self.players.get(&winner.player_id()))
                .map(|player| player.name.clone()),
        }
    }

    pub fn snapshot(&self, now: Instant) -> GameSnapshot {
        GameSnapshot {
            players: self.players.clone(),
            star: self.star,
            round: self.round.snapshot(now),
        }
    }
}
