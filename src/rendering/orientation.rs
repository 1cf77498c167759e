//! Display/storage coordinate adapter.
//!
//! Tiling always runs in the orientation tiles are stored in. A horizontal
//! mosaic is stored transposed relative to how it is shown, so its axes are
//! swapped exactly once, here, at the draw boundary.

use crate::core::config::Orientation;
use crate::core::geometry::{Point, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrientationAdapter {
    orientation: Orientation,
}

impl OrientationAdapter {
    pub fn new(orientation: Orientation) -> Self {
        Self { orientation }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Whether bitmaps must be drawn with swapped axes
    pub fn transposes(&self) -> bool {
        self.orientation == Orientation::Horizontal
    }

    pub fn to_storage_rect(&self, display: &Rect) -> Rect {
        if self.transposes() {
            display.transposed()
        } else {
            *display
        }
    }

    pub fn to_display_rect(&self, storage: &Rect) -> Rect {
        // Transposition is its own inverse
        self.to_storage_rect(storage)
    }

    pub fn to_storage_point(&self, display: Point) -> Point {
        if self.transposes() {
            Point::new(display.y, display.x)
        } else {
            display
        }
    }

    pub fn to_display_point(&self, storage: Point) -> Point {
        self.to_storage_point(storage)
    }

    /// Display extent of an image stored as `width` × `height`
    pub fn display_size(&self, width: f64, height: f64) -> (f64, f64) {
        if self.transposes() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertical_is_identity() {
        let adapter = OrientationAdapter::new(Orientation::Vertical);
        let rect = Rect::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(adapter.to_storage_rect(&rect), rect);
        assert_eq!(adapter.display_size(16384.0, 1024.0), (16384.0, 1024.0));
        assert!(!adapter.transposes());
    }

    #[test]
    fn test_horizontal_swaps_axes() {
        let adapter = OrientationAdapter::new(Orientation::Horizontal);
        let display = Rect::new(100.0, 20.0, 300.0, 40.0);
        let storage = adapter.to_storage_rect(&display);
        assert_eq!(storage, Rect::new(20.0, 100.0, 40.0, 300.0));
        assert_eq!(adapter.to_display_rect(&storage), display);
        assert_eq!(adapter.to_storage_point(Point::new(5.0, 9.0)), Point::new(9.0, 5.0));
        assert_eq!(adapter.display_size(1024.0, 16384.0), (16384.0, 1024.0));
    }
}
