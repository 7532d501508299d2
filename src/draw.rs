//! Draw-primitive command list
//!
//! The engine does not render. Once per frame it emits an ordered list of
//! `DrawCmd`s and the host surface paints them however it likes. Nothing
//! flows back from the surface into the simulation.

use glam::Vec2;

use crate::assets::ImageId;
use crate::sim::Rect;

/// RGBA color, 8 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u8, pub u8, pub u8, pub u8);

impl Color {
    pub const WHITE: Color = Color(255, 255, 255, 255);
    pub const IVORY: Color = Color(255, 255, 240, 255);
    pub const HONEYDEW: Color = Color(240, 255, 240, 255);
    pub const LAWN_GREEN: Color = Color(124, 252, 0, 255);
    pub const MEDIUM_SLATE_BLUE: Color = Color(123, 104, 238, 255);
    pub const RED: Color = Color(255, 0, 0, 255);
    pub const BLUE: Color = Color(0, 0, 255, 255);
    pub const YELLOW: Color = Color(255, 255, 0, 255);
    pub const ORANGE: Color = Color(255, 165, 0, 255);
    pub const BLACK: Color = Color(0, 0, 0, 255);
}

/// Horizontal text alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// One draw primitive, in paint order
#[derive(Debug, Clone)]
pub enum DrawCmd {
    /// Filled polygon (ship hull, thrust flame)
    Polygon { points: Vec<Vec2>, color: Color },
    /// Line segment (ground spans)
    Line {
        from: Vec2,
        to: Vec2,
        width: f32,
        color: Color,
    },
    /// Image blit (icons, gravity bodies, hostages, bullets)
    Sprite { image: ImageId, rect: Rect },
    /// Filled ellipse (fragments, minimap ghosts, imageless icons)
    Ellipse { rect: Rect, color: Color },
    /// Rectangle outline (minimap frame, debug rects)
    RectOutline { rect: Rect, color: Color },
    /// Text run (score bubbles, HUD, banners)
    Text {
        text: String,
        pos: Vec2,
        size: f32,
        color: Color,
        align: Align,
    },
}

/// A frame's worth of draw commands
#[derive(Debug, Default)]
pub struct Frame {
    pub cmds: Vec<DrawCmd>,
}

impl Frame {
    pub fn new() -> Self {
        Self { cmds: Vec::new() }
    }

    pub fn push(&mut self, cmd: DrawCmd) {
        self.cmds.push(cmd);
    }

    /// Centered text helper, the common HUD case
    pub fn text_centered(&mut self, text: impl Into<String>, y: f32, color: Color) {
        self.push(DrawCmd::Text {
            text: text.into(),
            pos: Vec2::new(crate::consts::GRID_WIDTH / 2.0, y),
            size: 22.0,
            color,
            align: Align::Center,
        });
    }
}
