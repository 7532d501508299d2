//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only; "now" is the tick-accumulated clock, never wall time
//! - Seeded RNG only
//! - Stable iteration order (by pool slot index)
//! - No rendering or platform dependencies (drawing is emitted as data)

pub mod collision;
pub mod entity;
pub mod gravity;
pub mod ground;
pub mod path;
pub mod pool;
pub mod tick;

pub use collision::CollisionKind;
pub use entity::{
    Category, CategoryMask, Entity, HostageKind, Kinematics, Payload, Rect, ShipData,
};
pub use ground::{GroundData, TerrainGen};
pub use path::{FlightPath, PathLeg};
pub use pool::{Handle, Pool, PoolExhausted};
pub use tick::{Event, GameState, MiniGameStatus, ScoreTag, TickInput, tick};

use crate::settings::Tuning;

/// Per-tick context threaded through every subsystem: one consistent notion
/// of "now" and one shared tuning table, no module globals.
#[derive(Debug, Clone, Copy)]
pub struct TickCtx<'a> {
    pub now_ms: i64,
    pub dt: f32,
    pub tuning: &'a Tuning,
    /// Whether the ship itself is currently subject to world gravity
    pub ship_gravity: bool,
}

/// Deadline helper: 0 means "disabled"
#[inline]
pub fn deadline_passed(target_ms: i64, now_ms: i64) -> bool {
    target_ms != 0 && now_ms > target_ms
}
