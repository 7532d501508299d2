//! Scrolling terrain
//!
//! The ground is a chain of line segments scrolling left at a constant
//! speed. Each segment, as its right end first scrolls into view, triggers
//! the spawn of its successor, so the corridor extends itself forever. Two
//! chains run at once: a floor and a ceiling, forming a corridor around a
//! configurable midpoint that narrows the longer a rescue run lasts.

use glam::Vec2;
use rand::Rng;

use crate::consts::GRID_HEIGHT;
use crate::settings::Tuning;

/// Ground-segment payload: the segment is a line from `left` to `right`
#[derive(Debug, Clone)]
pub struct GroundData {
    pub left: Vec2,
    pub right: Vec2,
    /// (width, signed height) of the segment span
    pub span: Vec2,
    pub is_bottom: bool,
    /// The successor spawn fires once, when the right end enters the screen
    pub triggered_next: bool,
}

impl GroundData {
    pub fn new(pos: Vec2, span: Vec2, is_bottom: bool) -> Self {
        Self {
            left: pos,
            right: pos + span,
            span,
            is_bottom,
            triggered_next: false,
        }
    }

    /// The segment's position is its left endpoint; keep both ends current
    pub fn update_endpoints(&mut self, pos: Vec2) {
        self.left = pos;
        self.right = pos + self.span;
    }
}

/// Alternating slope state for the two chains. Segments alternate rising
/// and falling so the corridor zigzags instead of drifting off-range.
#[derive(Debug, Clone, Copy)]
pub struct TerrainGen {
    pub increasing_bottom: bool,
    pub increasing_top: bool,
}

impl Default for TerrainGen {
    fn default() -> Self {
        Self {
            increasing_bottom: true,
            increasing_top: true,
        }
    }
}

impl TerrainGen {
    /// Dimensions for the next segment of one chain: random width and a
    /// signed height clamped so the chain stays inside its band.
    ///
    /// `narrowing_ms` is how long the current rescue run has lasted; the
    /// corridor tightens as it grows.
    pub fn next_span(
        &mut self,
        rng: &mut impl Rng,
        is_bottom: bool,
        current_y: f32,
        narrowing_ms: i64,
        tuning: &Tuning,
    ) -> Vec2 {
        const MIN_CLOSENESS: f32 = 32.0;
        const MAX_DIFF: f32 = 320.0;

        let mut squeeze = (narrowing_ms / 10_000) as f32;
        if squeeze > 20.0 {
            squeeze = 20.0;
        }
        let min_closeness = MIN_CLOSENESS - squeeze;
        let max_diff = MAX_DIFF - squeeze * 8.0;

        let midpoint = tuning.ground_midpoint;
        let upper_line_min = midpoint + max_diff / 2.0;
        let upper_line_max = midpoint + min_closeness / 2.0;
        let lower_line_min = midpoint - min_closeness / 2.0;
        let lower_line_max = midpoint - max_diff / 2.0;

        // band of allowed y values for this chain (screen coords)
        let (range_min_y, range_max_y) = if is_bottom {
            (GRID_HEIGHT - lower_line_min, GRID_HEIGHT - lower_line_max)
        } else {
            (GRID_HEIGHT - upper_line_min, GRID_HEIGHT - upper_line_max)
        };

        let width = rng.random_range(30.0..120.0);
        let mut height: f32 = rng.random_range(10.0..100.0);

        let increasing = if is_bottom {
            &mut self.increasing_bottom
        } else {
            &mut self.increasing_top
        };

        // rising segments move up-screen (negative y); clamp to the band
        if *increasing && height > current_y - range_min_y {
            height = current_y - range_min_y;
        } else if !*increasing && height > range_max_y - current_y {
            height = range_max_y - current_y;
        }

        let span = Vec2::new(width, height * if *increasing { -1.0 } else { 1.0 });
        *increasing = !*increasing;
        span
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn test_spans_alternate_slope() {
        let mut r#gen = TerrainGen::default();
        let mut rng = Pcg32::seed_from_u64(7);
        let tuning = Tuning::default();

        // start inside the floor chain's band
        let y = GRID_HEIGHT - tuning.ground_midpoint + 100.0;
        let a = r#gen.next_span(&mut rng, true, y, 0, &tuning);
        let b = r#gen.next_span(&mut rng, true, y, 0, &tuning);
        // one rises, the next falls
        assert!(a.y <= 0.0);
        assert!(b.y >= 0.0);
    }

    #[test]
    fn test_chain_stays_in_band() {
        let mut r#gen = TerrainGen::default();
        let mut rng = Pcg32::seed_from_u64(42);
        let tuning = Tuning::default();

        let mut y = GRID_HEIGHT - tuning.ground_midpoint;
        for _ in 0..200 {
            let span = r#gen.next_span(&mut rng, true, y, 0, &tuning);
            y += span.y;
            // the floor chain may never climb above the corridor midline
            // band or sink below the bottom band edge
            assert!(y >= GRID_HEIGHT - tuning.ground_midpoint - 170.0);
            assert!(y <= GRID_HEIGHT - tuning.ground_midpoint + 170.0);
        }
    }

    #[test]
    fn test_endpoints_track_position() {
        let mut g = GroundData::new(Vec2::new(1200.0, 700.0), Vec2::new(80.0, -40.0), true);
        assert_eq!(g.right, Vec2::new(1280.0, 660.0));

        g.update_endpoints(Vec2::new(1100.0, 700.0));
        assert_eq!(g.left, Vec2::new(1100.0, 700.0));
        assert_eq!(g.right, Vec2::new(1180.0, 660.0));
    }

    #[test]
    fn test_corridor_narrows_with_run_length() {
        let tuning = Tuning::default();
        let mut rng = Pcg32::seed_from_u64(3);

        // the band edges derive from the squeeze; a long run caps the
        // vertical swing harder than a fresh one does
        let mut fresh = TerrainGen::default();
        let mut late = TerrainGen::default();
        let y = GRID_HEIGHT - tuning.ground_midpoint;

        let mut fresh_max: f32 = 0.0;
        let mut late_max: f32 = 0.0;
        for _ in 0..100 {
            fresh_max = fresh_max.max(fresh.next_span(&mut rng, true, y, 0, &tuning).y.abs());
            late_max = late_max.max(late.next_span(&mut rng, true, y, 200_000, &tuning).y.abs());
        }
        // at a 20-point squeeze the falling clamp is 80 px; fresh allows 160
        assert!(late_max <= 80.0 + 1e-3);
        assert!(fresh_max <= 160.0 + 1e-3);
    }
}
