//! Entities and kinematics
//!
//! One simulated thing: identity (category), kinematic state, hit points,
//! timers, and a category-specific payload. Behavior dispatch is a single
//! match over the closed payload sum type - no trait objects in the hot
//! loop.

use glam::Vec2;

use super::ground::GroundData;
use super::path::FlightPath;
use super::pool::Handle;
use super::TickCtx;
use crate::assets::ImageId;
use crate::consts::{BULLET_SUBSTEPS, GRID_HEIGHT, GRID_WIDTH};
use crate::draw::{Align, Color, DrawCmd, Frame};
use crate::velocity_from_trig;

/// Axis-aligned rectangle, top-left anchored (y grows downward)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn from_pos_size(pos: Vec2, width: f32, height: f32) -> Self {
        Self {
            min: pos,
            max: pos + Vec2::new(width, height),
        }
    }

    /// Smallest rect containing all points
    pub fn containing(points: &[Vec2]) -> Self {
        let mut min = Vec2::splat(f32::INFINITY);
        let mut max = Vec2::splat(f32::NEG_INFINITY);
        for p in points {
            min = min.min(*p);
            max = max.max(*p);
        }
        Self { min, max }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }
}

/// Entity category. Each variant is a distinct bit so categories can be
/// OR'd into a killed-by mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Category {
    Ship = 1 << 0,
    Bullet = 1 << 1,
    Fragment = 1 << 2,
    ShipFragment = 1 << 3,
    Icon = 1 << 4,
    PathFollower = 1 << 5,
    Chaser = 1 << 6,
    Ground = 1 << 7,
    FlatEarth = 1 << 8,
    GravityBody = 1 << 9,
    MiniMapGhost = 1 << 10,
    Hostage = 1 << 11,
    TextBubble = 1 << 12,
}

impl Category {
    #[inline]
    pub const fn bit(self) -> u16 {
        self as u16
    }
}

/// A set of categories ("killed by", kill-all pulses)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CategoryMask(pub u16);

impl CategoryMask {
    pub const NONE: CategoryMask = CategoryMask(0);
    pub const ALL: CategoryMask = CategoryMask(u16::MAX);

    #[inline]
    pub const fn contains(self, cat: Category) -> bool {
        self.0 & cat.bit() != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Category {
    type Output = CategoryMask;
    fn bitor(self, rhs: Category) -> CategoryMask {
        CategoryMask(self.bit() | rhs.bit())
    }
}

impl std::ops::BitOr<Category> for CategoryMask {
    type Output = CategoryMask;
    fn bitor(self, rhs: Category) -> CategoryMask {
        CategoryMask(self.0 | rhs.bit())
    }
}

impl From<Category> for CategoryMask {
    fn from(cat: Category) -> Self {
        CategoryMask(cat.bit())
    }
}

/// Position / velocity / acceleration triple plus lifetime bookkeeping
#[derive(Debug, Clone, Copy, Default)]
pub struct Kinematics {
    pub pos: Vec2,
    pub vel: Vec2,
    pub acc: Vec2,
    /// Absolute expiry deadline in ms; 0 = never expires
    pub expire_at_ms: i64,
    /// Categories that may destroy this entity
    pub killed_by: CategoryMask,
}

impl Kinematics {
    pub fn new(
        pos: Vec2,
        vel: Vec2,
        acc: Vec2,
        lifetime_ms: i64,
        killed_by: CategoryMask,
        now_ms: i64,
    ) -> Self {
        Self {
            pos,
            vel,
            acc,
            expire_at_ms: if lifetime_ms != 0 { now_ms + lifetime_ms } else { 0 },
            killed_by,
        }
    }

    pub fn at(pos: Vec2, killed_by: CategoryMask) -> Self {
        Self {
            pos,
            killed_by,
            ..Default::default()
        }
    }
}

/// What kind of rescuable this is; scoring tier rises with rarity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostageKind {
    Soldier,
    Spy,
    Captain,
}

/// Continuous-rotation trick tracking for the ship
#[derive(Debug, Clone, Copy, Default)]
pub struct RotationTracker {
    pub was_rotating: bool,
    pub angle_start: f32,
    pub num_rotations: u32,
}

/// Ship-only state: heading, hull geometry, docking, trick tracking
#[derive(Debug, Clone)]
pub struct ShipData {
    pub angle: f32,
    pub angle_sin: f32,
    pub angle_cos: f32,
    pub thrusting: bool,
    pub thrust_enabled: bool,
    /// Rotated hull vertices: bottom-left, bottom-center, bottom-right, nose
    pub vertices: [Vec2; 4],
    pub thrust_vertices: [Vec2; 3],
    /// Nose point, cached as the bullet origin
    pub front: Vec2,
    /// 0 = not docked; otherwise the earliest undock time
    pub docked_until_ms: i64,
    pub rotation: RotationTracker,
    /// Updated by the director each tick; drives hull color + distance game
    pub distance_from_ground: f32,
}

impl Default for ShipData {
    fn default() -> Self {
        Self {
            angle: 0.0,
            angle_sin: 0.0,
            angle_cos: 1.0,
            thrusting: false,
            thrust_enabled: true,
            vertices: [Vec2::ZERO; 4],
            thrust_vertices: [Vec2::ZERO; 3],
            front: Vec2::ZERO,
            docked_until_ms: 0,
            rotation: RotationTracker::default(),
            distance_from_ground: f32::INFINITY,
        }
    }
}

/// Bullet-only state: the CCD sub-step rectangles for this tick
#[derive(Debug, Clone)]
pub struct BulletData {
    pub sub_rects: [Rect; BULLET_SUBSTEPS],
}

impl Default for BulletData {
    fn default() -> Self {
        Self {
            sub_rects: [Rect::default(); BULLET_SUBSTEPS],
        }
    }
}

/// Hostage-only state: anchored to a ground segment
#[derive(Debug, Clone)]
pub struct HostageData {
    pub kind: HostageKind,
    /// Non-owning; the segment the hostage stands on
    pub anchor: Handle,
    pub offset: Vec2,
}

/// Category-specific payload. Categories are mutually exclusive; the
/// category of an entity is derived from its payload, never stored twice.
#[derive(Debug, Clone)]
pub enum Payload {
    Ship(Box<ShipData>),
    Bullet(BulletData),
    Fragment,
    ShipFragment,
    Icon,
    PathFollower(Box<FlightPath>),
    Chaser,
    Ground(GroundData),
    FlatEarth,
    GravityBody,
    /// Mirrors its parent's position onto the minimap; liveness is always
    /// derived from the parent, never evaluated independently
    MiniMapGhost,
    Hostage(HostageData),
    TextBubble(String),
}

impl Payload {
    pub fn category(&self) -> Category {
        match self {
            Payload::Ship(_) => Category::Ship,
            Payload::Bullet(_) => Category::Bullet,
            Payload::Fragment => Category::Fragment,
            Payload::ShipFragment => Category::ShipFragment,
            Payload::Icon => Category::Icon,
            Payload::PathFollower(_) => Category::PathFollower,
            Payload::Chaser => Category::Chaser,
            Payload::Ground(_) => Category::Ground,
            Payload::FlatEarth => Category::FlatEarth,
            Payload::GravityBody => Category::GravityBody,
            Payload::MiniMapGhost => Category::MiniMapGhost,
            Payload::Hostage(_) => Category::Hostage,
            Payload::TextBubble(_) => Category::TextBubble,
        }
    }
}

/// One simulated game object, drawn from the pool
#[derive(Debug, Clone)]
pub struct Entity {
    pub kin: Kinematics,
    pub payload: Payload,
    pub hp: i32,
    /// Invisible/inactive until this time (0 = immediately ready)
    pub ready_after_ms: i64,
    pub num_animates: u32,
    pub has_friction: bool,
    pub is_fixed: bool,
    pub bound_velocity: bool,
    /// 0 = not gravitating
    pub mass: f32,
    pub width: f32,
    pub height: f32,
    pub image: Option<ImageId>,
    pub color: Color,
    /// Non-owning back-reference (minimap ghost -> mirrored entity)
    pub parent: Option<Handle>,
    /// Forward reference to at most one ghost child
    pub child: Option<Handle>,
    /// Recomputed every tick from position and size
    pub rect: Rect,
}

impl Entity {
    pub fn new(payload: Payload, kin: Kinematics) -> Self {
        Self {
            kin,
            payload,
            hp: 1,
            ready_after_ms: 0,
            num_animates: 0,
            has_friction: true,
            is_fixed: false,
            bound_velocity: true,
            mass: 0.0,
            width: 0.0,
            height: 0.0,
            image: None,
            color: Color::WHITE,
            parent: None,
            child: None,
            rect: Rect::default(),
        }
    }

    #[inline]
    pub fn category(&self) -> Category {
        self.payload.category()
    }

    #[inline]
    pub fn is(&self, cat: Category) -> bool {
        self.category() == cat
    }

    #[inline]
    pub fn is_one_of(&self, mask: CategoryMask) -> bool {
        mask.contains(self.category())
    }

    #[inline]
    pub fn is_killed_by(&self, cat: Category) -> bool {
        self.kin.killed_by.contains(cat)
    }

    #[inline]
    pub fn is_ready(&self, now_ms: i64) -> bool {
        self.ready_after_ms == 0 || now_ms > self.ready_after_ms
    }

    #[inline]
    pub fn has_gravity(&self) -> bool {
        self.mass != 0.0
    }

    /// Joining the gravity group turns off arcade-style damping
    pub fn set_mass(&mut self, mass: f32) {
        self.mass = mass;
        self.has_friction = false;
        self.bound_velocity = false;
    }

    pub fn set_size(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
    }

    pub fn set_sprite(&mut self, sprite: Option<(ImageId, f32, f32)>, fallback: (f32, f32)) {
        match sprite {
            Some((id, w, h)) => {
                self.image = Some(id);
                self.set_size(w, h);
            }
            None => self.set_size(fallback.0, fallback.1),
        }
    }

    pub fn wraps_horizontally(&self) -> bool {
        matches!(self.payload, Payload::Ship(_) | Payload::FlatEarth)
    }

    pub fn is_docked(&self) -> bool {
        matches!(&self.payload, Payload::Ship(s) if s.docked_until_ms != 0)
    }

    /// Anchor point a docking ship snaps to, just above the platform center
    pub fn flat_earth_dock_point(&self) -> Vec2 {
        self.kin.pos + Vec2::new(0.0, -25.0)
    }

    /// Resting on the world floor
    pub fn is_on_ground(&self) -> bool {
        self.kin.pos.y >= GRID_HEIGHT - 50.0
    }

    pub fn ship(&self) -> Option<&ShipData> {
        match &self.payload {
            Payload::Ship(s) => Some(s),
            _ => None,
        }
    }

    pub fn ship_mut(&mut self) -> Option<&mut ShipData> {
        match &mut self.payload {
            Payload::Ship(s) => Some(s),
            _ => None,
        }
    }

    /// Apply acceleration to velocity and velocity to position.
    ///
    /// Docked ships and hostage anchoring are handled by the director, which
    /// has the cross-entity positions in hand.
    pub fn integrate(&mut self, ctx: &TickCtx) {
        if self.is_fixed || self.is_docked() {
            return;
        }

        let dt = ctx.dt;

        if self.has_friction {
            // flip horizontal acceleration so it always opposes motion
            self.kin.acc.x = self.kin.acc.x.abs() * if self.kin.vel.x > 0.0 { -1.0 } else { 1.0 };
        }

        self.kin.vel += self.kin.acc * dt;

        if self.bound_velocity {
            if self.kin.vel.x.abs() < ctx.tuning.velocity_floor {
                self.kin.vel.x = 0.0; // snap to zero to avoid jitter
            }
            let vmax = ctx.tuning.velocity_max;
            self.kin.vel = self.kin.vel.clamp(Vec2::splat(-vmax), Vec2::splat(vmax));
        }

        self.kin.pos += self.kin.vel * dt;

        self.rect = Rect::from_pos_size(self.kin.pos, self.width, self.height);

        if let Payload::Bullet(b) = &mut self.payload {
            // sample the path swept this tick so fast bullets can't tunnel
            // through thin targets at low frame rates
            let step = dt / BULLET_SUBSTEPS as f32;
            for (k, rect) in b.sub_rects.iter_mut().enumerate() {
                let p = self.kin.pos + self.kin.vel * (step * k as f32);
                *rect = Rect::from_pos_size(p, self.width, self.height);
            }
        }

        if self.wraps_horizontally() {
            if self.kin.pos.x > GRID_WIDTH {
                self.kin.pos.x = 0.0;
            } else if self.kin.pos.x < 0.0 {
                self.kin.pos.x = GRID_WIDTH;
            }
        }

        if let Payload::Ship(_) = self.payload {
            if self.is_on_ground() {
                self.kin.vel.y = 0.0;
                if !ctx.ship_gravity {
                    self.kin.acc.y = 0.0;
                }
            }
        }
    }

    /// Whether this entity survives the tick. Ghost liveness is resolved by
    /// the pool, which passes the parent's verdict in.
    pub fn is_alive(&self, now_ms: i64, parent_alive: Option<bool>) -> bool {
        if let Some(alive) = parent_alive {
            return alive;
        }

        match &self.payload {
            // the ship never leaves the pool; it resets in place
            Payload::Ship(_) => return true,
            // ground segments die only by scrolling off the left edge
            Payload::Ground(g) => return g.right.x > 0.0,
            _ => {}
        }

        if self.hp <= 0 {
            return false;
        }

        if self.kin.expire_at_ms != 0 && now_ms > self.kin.expire_at_ms {
            return false;
        }

        // objects that leave the bottom edge never come back
        if !self.is(Category::GravityBody) && self.kin.pos.y >= GRID_HEIGHT {
            return false;
        }

        // most objects die when they drift off the sides
        if !matches!(
            self.payload,
            Payload::Ship(_) | Payload::Chaser | Payload::GravityBody
        ) && (self.kin.pos.x < -10.0 || self.kin.pos.x > GRID_WIDTH + 10.0)
        {
            return false;
        }

        true
    }

    /// Points tested against ground segments: the ship uses its rotated
    /// hull, everything else its center point.
    pub fn ground_sample_points(&self) -> Vec<Vec2> {
        match &self.payload {
            Payload::Ship(s) => s.vertices.to_vec(),
            _ => vec![self.kin.pos],
        }
    }

    // === Ship behavior ===

    /// Read held keys into heading and thrust. Returns the rotation count
    /// when a full rotation trick just completed.
    pub fn ship_control(&mut self, ctx: &TickCtx, rotate_left: bool, rotate_right: bool, thrust: bool) -> Option<u32> {
        let tuning = ctx.tuning;
        let rotate_step = tuning.rotate_speed * ctx.dt;
        let thrust_step = tuning.thrust_accel * ctx.dt;
        let now = ctx.now_ms;

        let Payload::Ship(ship) = &mut self.payload else {
            debug_assert!(false, "ship_control on a non-ship entity");
            return None;
        };

        let is_rotating = rotate_left || rotate_right;
        if rotate_right {
            ship.angle += rotate_step;
        }
        if rotate_left {
            ship.angle -= rotate_step;
        }

        let completed = check_rotation(&mut ship.rotation, ship.angle, is_rotating);

        // thrust cuts out after half a turn of continuous rotation, so a
        // rotation trick can't be farmed by thrust-spinning
        let rotating_a_while = ship.rotation.was_rotating
            && (ship.rotation.angle_start - ship.angle).abs() > std::f32::consts::FRAC_PI_2;

        // flatten out tiny angles so the ship reads as truly level
        if ship.angle.abs() < 1e-4 {
            ship.angle = 0.0;
        }

        ship.angle_sin = ship.angle.sin();
        ship.angle_cos = ship.angle.cos();

        ship.thrusting = false;
        if ship.thrust_enabled && !rotating_a_while && thrust {
            if ship.docked_until_ms != 0 && now > ship.docked_until_ms {
                // break dock and push off
                ship.docked_until_ms = 0;
                self.kin.vel = Vec2::new(0.0, -20.0);
                self.kin.acc = Vec2::new(20.0, tuning.ship_gravity);
            }

            if ship.docked_until_ms == 0 {
                self.kin.vel += velocity_from_trig(thrust_step, ship.angle_sin, ship.angle_cos);
                ship.thrusting = true;
            }
        }

        completed
    }

    /// Rebuild the rotated hull, collision rect, nose point, and thrust
    /// flame from the current position and heading.
    pub fn animate_ship(&mut self) {
        const BASE_W: f32 = 16.0;
        const HEIGHT: f32 = 8.0;
        const HALF_W: f32 = BASE_W / 2.0;
        const HALF_H: f32 = HEIGHT / 2.0;
        const CENTER_INDENT: f32 = 4.0;
        const THRUST_W: f32 = BASE_W / 4.0 - 1.0;
        const THRUST_H: f32 = 8.0;

        let pos = self.kin.pos;
        let Payload::Ship(ship) = &mut self.payload else {
            debug_assert!(false, "animate_ship on a non-ship entity");
            return;
        };
        let (sin, cos) = (ship.angle_sin, ship.angle_cos);

        let hull = [
            pos + Vec2::new(-HALF_W, HALF_H),             // bottom-left
            pos + Vec2::new(0.0, HALF_H - CENTER_INDENT), // bottom-center
            pos + Vec2::new(HALF_W, HALF_H),              // bottom-right
            pos + Vec2::new(0.0, -HALF_H),                // nose
        ];
        for (v, p) in ship.vertices.iter_mut().zip(hull) {
            *v = rotate_about(p, pos, sin, cos);
        }

        ship.front = rotate_about(pos + Vec2::new(0.0, -HALF_H), pos, sin, cos);

        if ship.thrusting {
            let flame = [
                pos + Vec2::new(-THRUST_W, HALF_H),
                pos + Vec2::new(0.0, HALF_H + THRUST_H),
                pos + Vec2::new(THRUST_W, HALF_H),
            ];
            for (v, p) in ship.thrust_vertices.iter_mut().zip(flame) {
                *v = rotate_about(p, pos, sin, cos);
            }
        } else {
            ship.thrust_vertices = [Vec2::ZERO; 3];
        }

        let vertices = ship.vertices;
        self.rect = Rect::containing(&vertices);
    }

    /// Emit this entity's draw primitive. `ship_color` carries the director's
    /// blink/proximity color decision for the hull.
    pub fn draw(&self, frame: &mut Frame, ship_color: Color) {
        match &self.payload {
            // skip the first bullet frame so it doesn't trail the nose
            Payload::Bullet(_) if self.num_animates == 0 => {}

            Payload::Ship(ship) => {
                frame.push(DrawCmd::Polygon {
                    points: ship.vertices.to_vec(),
                    color: ship_color,
                });
                if ship.thrusting {
                    frame.push(DrawCmd::Polygon {
                        points: ship.thrust_vertices.to_vec(),
                        color: Color::RED,
                    });
                }
            }

            Payload::Ground(g) => {
                frame.push(DrawCmd::Line {
                    from: g.left,
                    to: g.right,
                    width: 2.0,
                    color: Color::LAWN_GREEN,
                });
            }

            Payload::TextBubble(text) => {
                frame.push(DrawCmd::Text {
                    text: text.clone(),
                    pos: self.kin.pos,
                    size: 18.0,
                    color: self.color,
                    align: Align::Left,
                });
            }

            _ => {
                let rect = Rect::from_pos_size(self.kin.pos, self.width, self.height);
                match self.image {
                    Some(image) => frame.push(DrawCmd::Sprite { image, rect }),
                    None => frame.push(DrawCmd::Ellipse {
                        rect,
                        color: self.color,
                    }),
                }
            }
        }
    }
}

/// Rotate `p` around center `c` by the angle whose sin/cos are given
#[inline]
pub fn rotate_about(p: Vec2, c: Vec2, sin: f32, cos: f32) -> Vec2 {
    let d = p - c;
    c + Vec2::new(d.x * cos - d.y * sin, d.x * sin + d.y * cos)
}

/// Track continuous rotation; returns the rotation count each time another
/// full turn (less a forgiving quarter-turn) completes.
fn check_rotation(tracker: &mut RotationTracker, angle: f32, is_rotating: bool) -> Option<u32> {
    use std::f32::consts::{FRAC_PI_4, TAU};

    let mut completed = None;
    if is_rotating {
        if !tracker.was_rotating {
            tracker.angle_start = angle;
        } else {
            let angular_change = (tracker.angle_start - angle).abs();
            let next_threshold = (tracker.num_rotations + 1) as f32 * TAU - FRAC_PI_4;
            if angular_change > next_threshold {
                tracker.num_rotations += 1;
                completed = Some(tracker.num_rotations);
            }
        }
    } else {
        tracker.num_rotations = 0;
    }
    tracker.was_rotating = is_rotating;
    completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Tuning;

    fn ctx(tuning: &Tuning) -> TickCtx<'_> {
        TickCtx {
            now_ms: 1000,
            dt: 1.0 / 60.0,
            tuning,
            ship_gravity: true,
        }
    }

    #[test]
    fn test_mask_ops() {
        let mask = Category::Bullet | Category::Ship | Category::Ground;
        assert!(mask.contains(Category::Bullet));
        assert!(mask.contains(Category::Ground));
        assert!(!mask.contains(Category::Icon));
        assert!(CategoryMask::NONE.is_empty());
    }

    #[test]
    fn test_friction_opposes_velocity() {
        let tuning = Tuning::default();
        let mut e = Entity::new(
            Payload::Fragment,
            Kinematics::new(
                Vec2::ZERO,
                Vec2::new(10.0, 0.0),
                Vec2::new(5.0, 0.0),
                0,
                CategoryMask::NONE,
                0,
            ),
        );
        e.integrate(&ctx(&tuning));
        // moving right, so horizontal acceleration must point left
        assert!(e.kin.acc.x < 0.0);
        assert!(e.kin.vel.x < 10.0);

        e.kin.vel.x = -10.0;
        e.integrate(&ctx(&tuning));
        assert!(e.kin.acc.x > 0.0);
    }

    #[test]
    fn test_velocity_floor_snaps_to_zero() {
        let tuning = Tuning::default();
        let mut e = Entity::new(
            Payload::Icon,
            Kinematics::new(
                Vec2::ZERO,
                Vec2::new(0.5, 0.0),
                Vec2::ZERO,
                0,
                CategoryMask::NONE,
                0,
            ),
        );
        e.has_friction = false;
        e.integrate(&ctx(&tuning));
        assert_eq!(e.kin.vel.x, 0.0);
    }

    #[test]
    fn test_fixed_entity_never_moves() {
        let tuning = Tuning::default();
        let mut e = Entity::new(
            Payload::GravityBody,
            Kinematics::new(
                Vec2::new(100.0, 100.0),
                Vec2::new(50.0, 50.0),
                Vec2::ZERO,
                0,
                CategoryMask::NONE,
                0,
            ),
        );
        e.is_fixed = true;
        e.integrate(&ctx(&tuning));
        assert_eq!(e.kin.pos, Vec2::new(100.0, 100.0));
    }

    #[test]
    fn test_bullet_substeps_span_the_tick() {
        let tuning = Tuning::default();
        let mut e = Entity::new(
            Payload::Bullet(BulletData::default()),
            Kinematics::new(
                Vec2::ZERO,
                Vec2::new(1600.0, 0.0),
                Vec2::ZERO,
                0,
                CategoryMask::NONE,
                0,
            ),
        );
        e.has_friction = false;
        e.bound_velocity = false;
        e.set_size(4.0, 4.0);
        e.integrate(&ctx(&tuning));

        let Payload::Bullet(b) = &e.payload else {
            unreachable!()
        };
        // first sample sits at the new position, later samples march forward
        assert_eq!(b.sub_rects[0].min, e.kin.pos);
        let step = b.sub_rects[1].min.x - b.sub_rects[0].min.x;
        assert!(step > 0.0);
        for k in 1..BULLET_SUBSTEPS {
            let d = b.sub_rects[k].min.x - b.sub_rects[k - 1].min.x;
            assert!((d - step).abs() < 1e-3);
        }
    }

    #[test]
    fn test_expiry_deadline() {
        let e = Entity::new(
            Payload::Fragment,
            Kinematics::new(Vec2::new(50.0, 50.0), Vec2::ZERO, Vec2::ZERO, 500, CategoryMask::NONE, 1000),
        );
        assert!(e.is_alive(1400, None));
        assert!(!e.is_alive(1501, None));
    }

    #[test]
    fn test_ship_is_exempt_from_hp_death() {
        let mut e = Entity::new(
            Payload::Ship(Box::default()),
            Kinematics::at(Vec2::new(100.0, 100.0), CategoryMask::NONE),
        );
        e.hp = 0;
        assert!(e.is_alive(0, None));
    }

    #[test]
    fn test_ghost_liveness_is_derived() {
        let e = Entity::new(
            Payload::MiniMapGhost,
            Kinematics::at(Vec2::new(-500.0, -500.0), CategoryMask::NONE),
        );
        // well off-screen, but the parent's verdict wins either way
        assert!(e.is_alive(0, Some(true)));
        assert!(!e.is_alive(0, Some(false)));
    }

    #[test]
    fn test_rotation_trick_detection() {
        let mut t = RotationTracker::default();
        use std::f32::consts::TAU;

        // first tick just snapshots the start angle
        assert!(check_rotation(&mut t, 0.0, true).is_none());
        // a bit more than a full turn minus the quarter-turn slack
        assert_eq!(check_rotation(&mut t, TAU - 0.5, true), Some(1));
        // keep going for the double
        assert_eq!(check_rotation(&mut t, 2.0 * TAU - 0.5, true), Some(2));
        // letting go resets the count
        assert!(check_rotation(&mut t, 2.0 * TAU - 0.5, false).is_none());
        assert_eq!(t.num_rotations, 0);
    }

    #[test]
    fn test_ship_hull_rotates_with_heading() {
        let mut e = Entity::new(
            Payload::Ship(Box::default()),
            Kinematics::at(Vec2::new(600.0, 400.0), CategoryMask::NONE),
        );
        e.animate_ship();
        let upright_nose = e.ship().unwrap().vertices[3];
        assert!(upright_nose.y < 400.0); // nose points up

        // quarter turn clockwise: nose now points right
        {
            let ship = e.ship_mut().unwrap();
            ship.angle = std::f32::consts::FRAC_PI_2;
            ship.angle_sin = ship.angle.sin();
            ship.angle_cos = ship.angle.cos();
        }
        e.animate_ship();
        let nose = e.ship().unwrap().vertices[3];
        assert!(nose.x > 600.0);
        assert!((nose.y - 400.0).abs() < 1.0);
    }
}
