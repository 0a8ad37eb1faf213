//! Player kinematics for one simulation tick.
//!
//! The step is split into three phases that the game state runs in order:
//! per-player integration, pairwise collision, and the star pickup check.
//! Every phase visits players in ascending id order so a tick is fully
//! determined by the state it starts from.

use crate::config::PhysicsConfig;
use rand::Rng;
use shared::{Player, PlayerId, Star};
use std::collections::BTreeMap;

/// Advances a single player by one tick.
///
/// Held directions accelerate the player, friction decays the result, the
/// speed is capped, and the position is integrated with an implicit unit
/// time step. A player leaving the field is put back on the edge and the
/// offending velocity component is reflected and damped by `bounce`.
pub fn integrate(player: &mut Player, physics: &PhysicsConfig, field_width: f64, field_height: f64) {
    let input = player.input;

    // Opposite directions cancel out arithmetically
    if input.up {
        player.vy -= physics.acceleration;
    }
    if input.down {
        player.vy += physics.acceleration;
    }
    if input.left {
        player.vx -= physics.acceleration;
    }
    if input.right {
        player.vx += physics.acceleration;
    }

    player.vx *= physics.friction;
    player.vy *= physics.friction;

    let speed = player.speed();
    if speed > physics.max_speed {
        player.vx = player.vx / speed * physics.max_speed;
        player.vy = player.vy / speed * physics.max_speed;
    }

    player.x += player.vx;
    player.y += player.vy;

    let max_x = field_width - physics.player_size;
    let max_y = field_height - physics.player_size;

    if player.x < 0.0 {
        player.x = 0.0;
        player.vx *= -physics.bounce;
    }
    if player.x > max_x {
        player.x = max_x;
        player.vx *= -physics.bounce;
    }
    if player.y < 0.0 {
        player.y = 0.0;
        player.vy *= -physics.bounce;
    }
    if player.y > max_y {
        player.y = max_y;
        player.vy *= -physics.bounce;
    }
}

/// Pushes apart every pair of overlapping players.
///
/// Both players of a pair get a velocity of magnitude `collision_kick` along
/// the line between their centers, pointing away from each other. Pairs are
/// visited as `(a, b)` with `a < b`; a player in several pairs keeps the kick
/// of the last one. Returns the number of colliding pairs.
pub fn resolve_collisions(players: &mut BTreeMap<PlayerId, Player>, physics: &PhysicsConfig) -> usize {
    let centers: Vec<(PlayerId, f64, f64)> = players
        .iter()
        .map(|(id, player)| {
            let (cx, cy) = player.center(physics.player_size);
            (*id, cx, cy)
        })
        .collect();

    let mut collisions = 0;

    for i in 0..centers.len() {
        for j in (i + 1)..centers.len() {
            let (id_a, ax, ay) = centers[i];
            let (id_b, bx, by) = centers[j];

            let dx = ax - bx;
            let dy = ay - by;
            if (dx * dx + dy * dy).sqrt() >= physics.player_size {
                continue;
            }

            // Coincident centers give an angle of zero, so the pair splits along x
            let angle = dy.atan2(dx);
            let kick_x = angle.cos() * physics.collision_kick;
            let kick_y = angle.sin() * physics.collision_kick;

            if let Some(a) = players.get_mut(&id_a) {
                a.vx = kick_x;
                a.vy = kick_y;
            }
            if let Some(b) = players.get_mut(&id_b) {
                b.vx = -kick_x;
                b.vy = -kick_y;
            }
            collisions += 1;
        }
    }

    collisions
}

/// Returns the lowest id whose center lies strictly inside the pickup radius.
pub fn find_pickup(
    players: &BTreeMap<PlayerId, Player>,
    star: &Star,
    physics: &PhysicsConfig,
) -> Option<PlayerId> {
    let reach = physics.star_radius + physics.player_size / 2.0;

    players
        .iter()
        .find(|(_, player)| {
            let (cx, cy) = player.center(physics.player_size);
            let dx = cx - star.x;
            let dy = cy - star.y;
            (dx * dx + dy * dy).sqrt() < reach
        })
        .map(|(id, _)| *id)
}

/// Places the star uniformly inside the field inset by `margin` on every side.
pub fn random_star<R: Rng>(rng: &mut R, field_width: f64, field_height: f64, margin: f64) -> Star {
    Star {
        x: rng.gen_range(margin..field_width - margin),
        y: rng.gen_range(margin..field_height - margin),
    }
}

/// Random top-left corner for a new player that keeps the footprint on the field.
pub fn random_spawn<R: Rng>(rng: &mut R, field_width: f64, field_height: f64, size: f64) -> (f64, f64) {
    (
        rng.gen_range(0.0..field_width - size),
        rng.gen_range(0.0..field_height - size),
    )
}
