//! Collision detection
//!
//! Two independent checks per tick, both intentionally simple at pool sizes
//! in the low hundreds:
//!
//! 1. A pairwise O(n²) pass over active non-ground entities. Pairs are
//!    rejected by killed-by mask before any geometry runs. Bullets test all
//!    of their sub-step rectangles against the other entity's rectangle, so
//!    a fast bullet cannot tunnel through a thin target in one tick.
//! 2. A ground pass testing entity sample vertices against each terrain
//!    segment's line.

use glam::Vec2;

use super::entity::{Category, Entity, Payload, Rect};
use super::ground::GroundData;

/// How an entity got hit; ground and smart hits kill in one shot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionKind {
    Normal,
    WithGround,
    Smart,
}

/// Geometric overlap test for a pair, with bullet CCD dispatch
pub fn entities_overlap(a: &Entity, b: &Entity) -> bool {
    // two bullets never test each other (masks reject the pair first)
    debug_assert!(!(a.is(Category::Bullet) && b.is(Category::Bullet)));

    let (bullet, other) = match (&a.payload, &b.payload) {
        (Payload::Bullet(bullet), _) => (Some(bullet), b),
        (_, Payload::Bullet(bullet)) => (Some(bullet), a),
        _ => (None, b),
    };

    match bullet {
        Some(bullet) => bullet
            .sub_rects
            .iter()
            .any(|r| r.intersects(&other.rect)),
        None => a.rect.intersects(&b.rect),
    }
}

/// Whether this pair is worth a geometry test at all
#[inline]
pub fn masks_interact(a: &Entity, b: &Entity) -> bool {
    a.is_killed_by(b.category()) || b.is_killed_by(a.category())
}

/// Signed vertical distance from a point to a ground segment's line:
/// positive when the point is above the line. `None` when the point is
/// outside the segment's horizontal extent (or the segment is degenerate).
pub fn distance_to_line(right: Vec2, left: Vec2, pt: Vec2) -> Option<f32> {
    if pt.x < left.x || pt.x > right.x {
        return None;
    }
    if right.x - left.x == 0.0 {
        return None;
    }

    let slope = (right.y - left.y) / (right.x - left.x);
    let intercept = right.y - slope * right.x;
    let line_y = slope * pt.x + intercept;

    // y grows downward, so line_y - pt.y > 0 means the point is above
    Some(line_y - pt.y)
}

/// Point fell below a floor segment
pub fn is_under_line(right: Vec2, left: Vec2, pt: Vec2) -> bool {
    const GROUND_TOLERANCE: f32 = 0.0;
    matches!(distance_to_line(right, left, pt), Some(d) if d < -GROUND_TOLERANCE)
}

/// Point climbed above a ceiling segment. Large distances are ignored so a
/// point under a far-away ceiling doesn't read as a strike.
pub fn is_above_line(right: Vec2, left: Vec2, pt: Vec2) -> bool {
    match distance_to_line(right, left, pt) {
        Some(d) => d > 0.0 && d <= 1000.0,
        None => false,
    }
}

/// Did any of the entity's sample points strike this segment?
pub fn struck_ground(ground: &GroundData, sample_points: &[Vec2]) -> bool {
    sample_points.iter().any(|&pt| {
        if ground.is_bottom {
            is_under_line(ground.right, ground.left, pt)
        } else {
            is_above_line(ground.right, ground.left, pt)
        }
    })
}

/// Smallest vertical clearance from any sample point to this segment
pub fn clearance_to_segment(ground: &GroundData, sample_points: &[Vec2]) -> f32 {
    sample_points
        .iter()
        .filter_map(|&pt| distance_to_line(ground.right, ground.left, pt))
        .fold(f32::INFINITY, f32::min)
}
