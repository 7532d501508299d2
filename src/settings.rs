//! Data-driven game balance
//!
//! Every gameplay constant lives in one serde table so a balance pass is a
//! JSON edit, not a recompile. The simulation never reads these through a
//! global - the tick threads an immutable [`TickCtx`](crate::sim::TickCtx)
//! carrying the table through every subsystem.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Gameplay tuning table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    // === Ship handling ===
    /// Rotation rate (radians/sec)
    pub rotate_speed: f32,
    /// Thrust as velocity change per second
    pub thrust_accel: f32,
    /// Downward acceleration applied to the ship when ship gravity is on
    pub ship_gravity: f32,
    pub ship_hit_points: i32,
    /// Respawn grace: invisible/inactive window after a reset (ms)
    pub ship_ready_ms: i64,
    /// Ground collisions ignored for this long after a reset (ms)
    pub ship_safe_ms: i64,
    pub ship_mass: f32,

    // === Kinematics ===
    /// |vx| below this snaps to zero (anti-jitter)
    pub velocity_floor: f32,
    /// Symmetric velocity clamp when bounding is enabled
    pub velocity_max: f32,

    // === Bullets ===
    pub bullet_speed: f32,
    pub bullet_lifetime_ms: i64,
    pub fire_interval_ms: i64,

    // === Gravity (stylized, not physical - see DESIGN.md) ===
    pub gravity_g: f32,
    pub gravity_min: f32,
    pub gravity_max: f32,
    pub body_mass_min: f32,
    pub body_mass_max: f32,
    pub black_hole_mass_min: f32,
    pub black_hole_mass_max: f32,

    // === Terrain ===
    /// Leftward scroll speed of bottom ground segments (px/sec)
    pub ground_speed: f32,
    /// Ceiling segments scroll this much faster
    pub ground_ceiling_extra: f32,
    /// Vertical center of the terrain corridor, measured up from the bottom
    pub ground_midpoint: f32,

    // === Spawn cadences (ms) ===
    pub falling_base_ms: i64,
    pub falling_rand_ms: i64,
    /// Both cadences narrow by this much per level
    pub falling_level_step_ms: i64,
    pub falling_base_floor_ms: i64,
    pub falling_rand_floor_ms: i64,
    pub crawling_interval_ms: i64,
    pub chaser_respawn_ms: i64,
    pub hostage_min_ms: i64,
    pub hostage_max_ms: i64,

    // === Progression ===
    pub level_banner_ms: i64,
    pub starting_smart_bombs: i32,

    // === Distance mini-game ===
    /// Score rises below this ground distance, falls above it
    pub distance_cutoff: f32,
    pub distance_start_points: i32,
    /// Caps the per-tick penalty while far from the ground
    pub distance_max_penalty: i32,
    pub distance_rotation_bonus: i32,
    pub interval_between_games_ms: i64,

    // === Rescue mini-game ===
    pub rescue_lives: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            rotate_speed: 4.7,
            thrust_accel: 600.0,
            ship_gravity: 80.0,
            ship_hit_points: 6,
            ship_ready_ms: 100,
            ship_safe_ms: 3000,
            ship_mass: 20.0,

            velocity_floor: 1.0,
            velocity_max: 500.0,

            bullet_speed: 1600.0,
            bullet_lifetime_ms: 5000,
            fire_interval_ms: 200,

            gravity_g: 9800.0,
            gravity_min: 20.0,
            gravity_max: 70.0,
            body_mass_min: 10.0,
            body_mass_max: 20.0,
            black_hole_mass_min: 10000.0,
            black_hole_mass_max: 20000.0,

            ground_speed: 150.0,
            ground_ceiling_extra: 20.0,
            ground_midpoint: 300.0,

            falling_base_ms: 500,
            falling_rand_ms: 1200,
            falling_level_step_ms: 100,
            falling_base_floor_ms: 100,
            falling_rand_floor_ms: 500,
            crawling_interval_ms: 3000,
            chaser_respawn_ms: 10_000,
            hostage_min_ms: 2000,
            hostage_max_ms: 6000,

            level_banner_ms: 3000,
            starting_smart_bombs: 4,

            distance_cutoff: 44.0,
            distance_start_points: 5000,
            distance_max_penalty: 20,
            distance_rotation_bonus: 2000,
            interval_between_games_ms: 1000,

            rescue_lives: 3,
        }
    }
}

impl Tuning {
    /// Load a tuning override; falls back to defaults on any problem
    pub fn load(path: impl AsRef<Path>) -> Self {
        match fs::read_to_string(path.as_ref()) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(tuning) => {
                    log::info!("loaded tuning from {}", path.as_ref().display());
                    tuning
                }
                Err(e) => {
                    log::warn!("tuning file invalid ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("no tuning file, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).expect("tuning serializes");
        fs::write(path.as_ref(), json)
    }
}
