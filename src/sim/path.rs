//! Scripted point-to-point motion
//!
//! A path is a list of (target, travel-time, pause-time) legs, expanded into
//! alternating move/hold waypoints that share a target. The follower derives
//! a constant velocity per leg instead of snapping to targets, so small
//! position error accumulates within a leg and resets at the next - cheaper
//! than exact arrival and invisible at game speeds.

use glam::Vec2;

use super::entity::Kinematics;
use crate::consts::MAX_PATH_POINTS;

/// Below this speed the follower parks instead of crawling (px/sec)
const SPEED_FLOOR: f32 = 4.0;

/// One scripted leg
#[derive(Debug, Clone, Copy)]
pub struct PathLeg {
    pub target: Vec2,
    pub travel_ms: i64,
    pub pause_ms: i64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Waypoint {
    pos: Vec2,
    duration_ms: i64,
}

/// A follower's expanded waypoint list, consumed cyclically
#[derive(Debug, Clone)]
pub struct FlightPath {
    points: [Waypoint; MAX_PATH_POINTS],
    len: usize,
    /// Number of waypoint switches so far (wraps via modulo)
    index: usize,
    last_switch_ms: i64,
}

impl Default for FlightPath {
    fn default() -> Self {
        Self {
            points: [Waypoint::default(); MAX_PATH_POINTS],
            len: 0,
            index: 0,
            last_switch_ms: 0,
        }
    }
}

impl FlightPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a leg as its move + hold waypoint pair. Returns false (and
    /// drops the leg) once the fixed-size list is full.
    pub fn add_leg(&mut self, leg: PathLeg) -> bool {
        if self.len + 2 > MAX_PATH_POINTS {
            return false;
        }
        self.points[self.len] = Waypoint {
            pos: leg.target,
            duration_ms: leg.travel_ms,
        };
        self.points[self.len + 1] = Waypoint {
            pos: leg.target,
            duration_ms: leg.pause_ms,
        };
        self.len += 2;
        true
    }

    pub fn num_points(&self) -> usize {
        self.len
    }

    /// Advance the waypoint clock and retarget velocity when the current
    /// waypoint's duration elapses.
    pub fn advance(&mut self, kin: &mut Kinematics, now_ms: i64) {
        if self.len == 0 {
            return;
        }

        if now_ms - self.last_switch_ms <= self.points[self.index % self.len].duration_ms {
            return;
        }
        self.last_switch_ms = now_ms;

        let current = self.index % self.len;
        let next = (self.index + 1) % self.len;
        let is_first = self.index == 0;
        self.index += 1;

        // the very first waypoint snaps; after that we aim from wherever we
        // actually are, so a missed target never shows as a teleport
        if is_first {
            kin.pos = self.points[current].pos;
        }

        let target = self.points[next];
        if target.pos == kin.pos {
            kin.vel = Vec2::ZERO;
            return;
        }
        if target.duration_ms <= 0 {
            kin.pos = target.pos;
            kin.vel = Vec2::ZERO;
            return;
        }

        let distance = target.pos.distance(kin.pos);
        let mut speed = distance * 1000.0 / target.duration_ms as f32;
        if speed < SPEED_FLOOR {
            speed = 0.0;
        }

        let angle = (target.pos.y - kin.pos.y).atan2(target.pos.x - kin.pos.x);
        kin.vel = Vec2::new(speed * angle.cos(), speed * angle.sin());
    }
}

/// The fixed showcase route every fifth follower flies
pub fn mutant_path() -> FlightPath {
    const LEGS: [((f32, f32), i64, i64); 12] = [
        ((200.0, 40.0), 0, 2000),
        ((200.0, 100.0), 200, 1000),
        ((450.0, 60.0), 100, 500),
        ((350.0, 60.0), 100, 400),
        ((500.0, 60.0), 100, 400),
        ((200.0, 60.0), 100, 300),
        ((500.0, 60.0), 100, 300),
        ((300.0, 60.0), 100, 300),
        ((110.0, 60.0), 100, 300),
        ((90.0, 60.0), 100, 500),
        ((160.0, 60.0), 100, 400),
        ((80.0, 120.0), 100, 1000),
    ];
    let mut path = FlightPath::new();
    for ((x, y), travel, pause) in LEGS {
        path.add_leg(PathLeg {
            target: Vec2::new(x, y),
            travel_ms: travel,
            pause_ms: pause,
        });
    }
    path
}
