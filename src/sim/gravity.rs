//! Pairwise gravity
//!
//! A stylized inverse-square law: the raw magnitude is lifted by the band
//! minimum and clamped into [min_g, max_g]. The clamp runs after the
//! inverse-square step, in exactly that order - changing it rebalances the
//! whole game at short and long range.

use glam::Vec2;

use super::pool::Pool;
use crate::settings::Tuning;

/// Acceleration applied to the second body of a pair; the first body gets
/// the exact negative (one increment each, per pair, per tick).
pub fn pair_acceleration(p1: Vec2, m1: f32, p2: Vec2, m2: f32, tuning: &Tuning) -> Vec2 {
    let d = p1.distance(p2);
    let raw = (tuning.gravity_g * m1 * m2) / (d * d);

    let g = (raw + tuning.gravity_min).clamp(tuning.gravity_min, tuning.gravity_max);

    let angle = (p1.x - p2.x).atan2(p1.y - p2.y);
    Vec2::new(g * angle.sin(), g * angle.cos())
}

/// Zero every gravitating entity's accumulated acceleration, then apply the
/// pairwise pass. Fixed bodies pull on others but never accumulate any
/// acceleration of their own.
pub fn apply(pool: &mut Pool, now_ms: i64, tuning: &Tuning) {
    let capacity = pool.capacity();

    for k in 0..capacity {
        if let Some(e) = pool.entity_at_mut(k) {
            if e.has_gravity() {
                e.kin.acc = Vec2::ZERO;
            }
        }
    }

    for k in 0..capacity.saturating_sub(1) {
        let Some((p1, m1, fixed1)) = gravitating(pool, k, now_ms) else {
            continue;
        };
        for j in (k + 1)..capacity {
            let Some((p2, m2, fixed2)) = gravitating(pool, j, now_ms) else {
                continue;
            };

            let a = pair_acceleration(p1, m1, p2, m2, tuning);

            if !fixed1 {
                if let Some(e) = pool.entity_at_mut(k) {
                    e.kin.acc -= a;
                }
            }
            if !fixed2 {
                if let Some(e) = pool.entity_at_mut(j) {
                    e.kin.acc += a;
                }
            }
        }
    }
}

fn gravitating(pool: &Pool, index: usize, now_ms: i64) -> Option<(Vec2, f32, bool)> {
    if !pool.is_active(index, now_ms) {
        return None;
    }
    let e = pool.entity_at(index)?;
    if !e.has_gravity() {
        return None;
    }
    Some((e.kin.pos, e.mass, e.is_fixed))
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// For any pair geometry and masses, the applied magnitude stays
        /// inside the tuned band.
        #[test]
        fn prop_clamp_band_holds(
            x1 in -2000.0f32..2000.0,
            y1 in -2000.0f32..2000.0,
            x2 in -2000.0f32..2000.0,
            y2 in -2000.0f32..2000.0,
            m1 in 0.001f32..50_000.0,
            m2 in 0.001f32..50_000.0,
        ) {
            prop_assume!((x1 - x2).abs() > 1e-3 || (y1 - y2).abs() > 1e-3);
            let tuning = Tuning::default();
            let a = pair_acceleration(
                Vec2::new(x1, y1),
                m1,
                Vec2::new(x2, y2),
                m2,
                &tuning,
            );
            prop_assert!(a.length() >= tuning.gravity_min - 1e-2);
            prop_assert!(a.length() <= tuning.gravity_max + 1e-2);
        }
    }
}
