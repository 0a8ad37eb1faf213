//! Round lifecycle: scores, leaderboard, winner history and the round clock.

use crate::utils::get_timestamp;
use log::info;
use shared::{LeaderboardEntry, PlayerId, RoundSnapshot, WinnerRecord, LEADERBOARD_SIZE};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// What happened when a round was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Number of the round that just ended
    pub round: u32,
    /// Leaderboard head at the moment the round ended, if anyone scored
    pub winner: Option<LeaderboardEntry>,
}

/// Owns the single live round and the history of previous winners.
#[derive(Debug, Clone)]
pub struct RoundManager {
    number: u32,
    started_at: Instant,
    duration: Duration,
    scores: BTreeMap<PlayerId, u32>,
    leaderboard: Vec<LeaderboardEntry>,
    previous_winners: Vec<WinnerRecord>,
}

impl RoundManager {
    pub fn new(duration: Duration, now: Instant) -> Self {
        Self {
            number: 1,
            started_at: now,
            duration,
            scores: BTreeMap::new(),
            leaderboard: Vec::new(),
            previous_winners: Vec::new(),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn scores(&self) -> &BTreeMap<PlayerId, u32> {
        &self.scores
    }

    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    pub fn previous_winners(&self) -> &[WinnerRecord] {
        &self.previous_winners
    }

    pub fn time_left(&self, now: Instant) -> Duration {
        self.duration
            .saturating_sub(now.saturating_duration_since(self.started_at))
    }

    /// Starts tracking a newly joined player with zero points.
    pub fn add_player(&mut self, player_id: PlayerId) {
        self.scores.insert(player_id, 0);
    }

    /// Forgets a departed player's score. Returns whether an entry existed.
    pub fn remove_player(&mut self, player_id: &PlayerId) -> bool {
        let removed = self.scores.remove(player_id).is_some();
        self.recompute_leaderboard();
        removed
    }

    /// Adds one point and returns the player's new score.
    pub fn award_point(&mut self, player_id: PlayerId) -> u32 {
        let score = self.scores.entry(player_id).or_insert(0);
        *score += 1;
        let score = *score;
        self.recompute_leaderboard();
        score
    }

    /// Rebuilds the top entries: highest score first, ties going to the
    /// lower player id.
    pub fn recompute_leaderboard(&mut self) {
        let mut entries: Vec<LeaderboardEntry> = self
            .scores
            .iter()
            .map(|(id, score)| LeaderboardEntry(*id, *score))
            .collect();

        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        entries.truncate(LEADERBOARD_SIZE);
        self.leaderboard = entries;
    }

    /// Round clock check. Ends the round once the configured duration has
    /// elapsed and reports the outcome.
    pub fn tick(&mut self, now: Instant) -> Option<RoundOutcome> {
        let elapsed = now.saturating_duration_since(self.started_at);

        if elapsed >= self.duration {
            Some(self.end_round(now))
        } else {
            None
        }
    }

    /// Closes the current round and opens the next one.
    ///
    /// The winner, if any, is appended to the history. Scores are cleared;
    /// the caller is responsible for moving the star.
    pub fn end_round(&mut self, now: Instant) -> RoundOutcome {
        self.recompute_leaderboard();
        let winner = self.leaderboard.first().copied();

        if let Some(LeaderboardEntry(player_id, score)) = winner {
            self.previous_winners.push(WinnerRecord {
                round: self.number,
                player_id,
                score,
                timestamp: get_timestamp(),
            });
        }

        let outcome = RoundOutcome {
            round: self.number,
            winner,
        };
        info!(
            "Round {} ended, winner: {}",
            outcome.round,
            winner
                .map(|w| format!("{} with {} points", w.0, w.1))
                .unwrap_or_else(|| "none".to_string())
        );

        self.number += 1;
        self.started_at = now;
        self.scores.clear();
        self.leaderboard.clear();

        outcome
    }

    pub fn snapshot(&self, now: Instant) -> RoundSnapshot {
        RoundSnapshot {
            number: self.number,
            time_left: self.time_left(now).as_millis() as u64,
            scores: self.scores.clone(),
            leaderboard: self.leaderboard.clone(),
            previous_winners: self.previous_winners.clone(),
        }
    }
}
