//! Space Rescue - a side-scrolling gravity-lander arcade game
//!
//! Core modules:
//! - `sim`: Deterministic simulation (object pool, physics, collisions, scoring)
//! - `draw`: Draw-primitive command list the host surface consumes
//! - `assets`: Image registry, loaded once at startup
//! - `audio`: Music rotation collaborator
//! - `highscores`: Persisted best score
//! - `settings`: Data-driven game balance

pub mod assets;
pub mod audio;
pub mod draw;
pub mod highscores;
pub mod settings;
pub mod sim;

pub use highscores::HighScore;
pub use settings::Tuning;

use glam::Vec2;

/// Game configuration constants
pub mod consts {
    /// Fixed simulation timestep (60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;

    /// Playfield dimensions (pixels, y grows downward)
    pub const GRID_WIDTH: f32 = 1200.0;
    pub const GRID_HEIGHT: f32 = 800.0;

    /// Object pool capacity
    pub const POOL_CAPACITY: usize = 1024;

    /// Sub-step rectangles sampled per bullet per tick (continuous collision)
    pub const BULLET_SUBSTEPS: usize = 8;

    /// Maximum waypoints per scripted path (two per leg: move + hold)
    pub const MAX_PATH_POINTS: usize = 32;

    /// Ring buffer of recent ship positions the chaser trails behind
    pub const TRAIL_LENGTH: usize = 512;
    /// How many samples back the chaser pins itself
    pub const TRAIL_LAG: usize = 60;

    /// Minimap placement
    pub const MINIMAP_LEFT: f32 = 80.0;
    pub const MINIMAP_TOP: f32 = 60.0;
    pub const MINIMAP_HEIGHT: f32 = 30.0;
    pub const MINIMAP_WIDTH: f32 = GRID_WIDTH * MINIMAP_HEIGHT / GRID_HEIGHT;
    pub const MINIMAP_OUTER_RATIO: f32 = 4.0;
}

/// Velocity vector for a ship-style heading: angle 0 points straight up,
/// positive angles rotate clockwise (y grows downward).
#[inline]
pub fn velocity_from_heading(speed: f32, angle: f32) -> Vec2 {
    Vec2::new(speed * angle.sin(), -(speed * angle.cos()))
}

/// Same, from a pre-computed (sin, cos) pair
#[inline]
pub fn velocity_from_trig(speed: f32, sin: f32, cos: f32) -> Vec2 {
    Vec2::new(speed * sin, -(speed * cos))
}

/// Map a value from one range onto another (no clamping)
#[inline]
pub fn interpolate(a1: f32, a2: f32, a: f32, b1: f32, b2: f32) -> f32 {
    b1 + ((a - a1) * (b2 - b1)) / (a2 - a1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_velocity_from_heading_up() {
        let v = velocity_from_heading(100.0, 0.0);
        assert!(v.x.abs() < 1e-4);
        assert!((v.y - (-100.0)).abs() < 1e-4);
    }

    #[test]
    fn test_interpolate_endpoints() {
        assert!((interpolate(0.0, 10.0, 0.0, 100.0, 200.0) - 100.0).abs() < 1e-4);
        assert!((interpolate(0.0, 10.0, 10.0, 100.0, 200.0) - 200.0).abs() < 1e-4);
        assert!((interpolate(0.0, 10.0, 5.0, 100.0, 200.0) - 150.0).abs() < 1e-4);
    }
}
