use crate::core::geometry::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Affine camera mapping world coordinates to screen pixels.
///
/// `screen = world * scale + translate`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub translate_x: f64,
    pub translate_y: f64,
    pub scale: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            translate_x: 0.0,
            translate_y: 0.0,
            scale: 1.0,
        }
    }
}

impl Camera {
    pub fn new(translate_x: f64, translate_y: f64, scale: f64) -> Self {
        Self {
            translate_x,
            translate_y,
            scale,
        }
    }

    fn safe_scale(&self) -> f64 {
        if self.scale.is_finite() && self.scale > 0.0 {
            self.scale
        } else {
            1.0
        }
    }

    pub fn screen_to_world(&self, screen: Point) -> Point {
        let s = self.safe_scale();
        Point::new(
            (screen.x - self.translate_x) / s,
            (screen.y - self.translate_y) / s,
        )
    }

    pub fn world_to_screen(&self, world: Point) -> Point {
        Point::new(
            world.x * self.scale + self.translate_x,
            world.y * self.scale + self.translate_y,
        )
    }

    pub fn world_rect_to_screen(&self, rect: &Rect) -> Rect {
        Rect::new(
            rect.x * self.scale + self.translate_x,
            rect.y * self.scale + self.translate_y,
            rect.width * self.scale,
            rect.height * self.scale,
        )
    }

    /// World rectangle visible in a container of the given screen size
    pub fn visible_rect(&self, container_width: f64, container_height: f64) -> Rect {
        let s = self.safe_scale();
        Rect::new(
            -self.translate_x / s,
            -self.translate_y / s,
            container_width.max(0.0) / s,
            container_height.max(0.0) / s,
        )
    }

    /// Translation that puts `world` under `screen` at `scale`
    pub fn anchored(world: Point, screen: Point, scale: f64) -> Self {
        Self::new(screen.x - world.x * scale, screen.y - world.y * scale, scale)
    }
}
