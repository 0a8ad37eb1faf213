use rand::Rng;
use shared::PLAYER_COLORS;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// Pick a player colour from the fixed palette
pub fn random_color<R: Rng>(rng: &mut R) -> String {
    PLAYER_COLORS[rng.gen_range(0..PLAYER_COLORS.len())].to_string()
}

pub fn display_name(slot: u32) -> String {
    format!("Player{}", slot)
}
