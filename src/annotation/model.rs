use crate::core::geometry::{Point, Rect};
use crate::tiles::key::{MosaicView, Surface};
use serde::{Deserialize, Serialize};

/// Client-side annotation id, stable for the lifetime of an engine
pub type LocalId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationStatus {
    /// Client-only, not yet persisted
    Draft,
    Submitted,
}

/// Persistence state shown next to an annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Synced,
    /// A create/update/delete is queued or in flight
    Pending,
    /// Retries are exhausted; the local copy differs from the server
    Unsynced,
}

/// Rectangular defect mark in display world coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: LocalId,
    pub bbox: Rect,
    pub status: AnnotationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark: Option<String>,
    pub surface: Surface,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<MosaicView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default)]
    pub sync_state: SyncState,
}

impl Annotation {
    pub fn draft(id: LocalId, bbox: Rect, surface: Surface, view: Option<MosaicView>) -> Self {
        Self {
            id,
            bbox,
            status: AnnotationStatus::Draft,
            class_id: None,
            class_name: None,
            mark: None,
            surface,
            view,
            server_id: None,
            sync_state: SyncState::Synced,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.status == AnnotationStatus::Draft
    }

    pub fn is_submitted(&self) -> bool {
        self.status == AnnotationStatus::Submitted
    }

    /// Corner handle within `tolerance` world units of `point`
    pub fn handle_at(&self, point: Point, tolerance: f64) -> Option<Handle> {
        Handle::ALL
            .into_iter()
            .find(|handle| handle.position(&self.bbox).distance_to(&point) <= tolerance)
    }

    pub fn contains(&self, point: Point) -> bool {
        self.bbox.contains(&point)
    }
}

/// Corner handles used for resizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl Handle {
    pub const ALL: [Handle; 4] = [
        Handle::TopLeft,
        Handle::TopRight,
        Handle::BottomRight,
        Handle::BottomLeft,
    ];

    pub fn position(self, rect: &Rect) -> Point {
        match self {
            Handle::TopLeft => Point::new(rect.x, rect.y),
            Handle::TopRight => Point::new(rect.right(), rect.y),
            Handle::BottomRight => Point::new(rect.right(), rect.bottom()),
            Handle::BottomLeft => Point::new(rect.x, rect.bottom()),
        }
    }

    /// The corner that stays fixed while this handle is dragged
    pub fn opposite(self) -> Handle {
        match self {
            Handle::TopLeft => Handle::BottomRight,
            Handle::TopRight => Handle::BottomLeft,
            Handle::BottomRight => Handle::TopLeft,
            Handle::BottomLeft => Handle::TopRight,
        }
    }

    /// `original` with this corner dragged to `pointer`; flips past the fixed corner
    pub fn resize(self, original: &Rect, pointer: Point) -> Rect {
        Rect::from_corners(self.opposite().position(original), pointer)
    }
}

/// Ephemeral measurement box, never persisted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: u64,
    pub rect: Rect,
}

impl Measurement {
    /// "W × H" in world units (image pixels)
    pub fn label(&self) -> String {
        format!("{:.0} × {:.0}", self.rect.width, self.rect.height)
    }
}

/// Which annotations are loaded: one surface of one sequence on one line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationContext {
    pub line_key: String,
    pub sequence_id: u64,
    pub surface: Surface,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<MosaicView>,
}

impl AnnotationContext {
    pub fn new(line_key: impl Into<String>, sequence_id: u64, surface: Surface) -> Self {
        Self {
            line_key: line_key.into(),
            sequence_id,
            surface,
            view: None,
        }
    }

    pub fn with_view(mut self, view: MosaicView) -> Self {
        self.view = Some(view);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_hit_and_resize() {
        let ann = Annotation::draft(1, Rect::new(10.0, 10.0, 100.0, 50.0), Surface::Top, None);
        assert_eq!(ann.handle_at(Point::new(111.0, 61.0), 2.0), Some(Handle::BottomRight));
        assert_eq!(ann.handle_at(Point::new(60.0, 30.0), 2.0), None);
        assert!(ann.contains(Point::new(60.0, 30.0)));

        let resized = Handle::BottomRight.resize(&ann.bbox, Point::new(50.0, 40.0));
        assert_eq!(resized, Rect::new(10.0, 10.0, 40.0, 30.0));

        // Dragging past the fixed corner flips the rectangle
        let flipped = Handle::TopLeft.resize(&ann.bbox, Point::new(200.0, 100.0));
        assert_eq!(flipped, Rect::new(110.0, 60.0, 90.0, 40.0));
    }

    #[test]
    fn test_measurement_label() {
        let m = Measurement {
            id: 1,
            rect: Rect::new(0.0, 0.0, 50.4, 19.6),
        };
        assert_eq!(m.label(), "50 × 20");
    }
}
