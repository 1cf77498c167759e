//! Annotation overlay drawing

use super::engine::AnnotationEngine;
use super::model::{Annotation, Handle, SyncState};
use crate::core::camera::Camera;
use crate::core::geometry::{Point, Rect};
use crate::rendering::surface::{Color, DrawSurface, StrokeStyle};
use image::Rgba;

/// Colours and stroke sizes of the annotation layer
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationPalette {
    pub draft: Color,
    pub submitted: Color,
    pub selected: Color,
    pub unsynced: Color,
    pub measurement: Color,
    pub rubber_band: Color,
    pub label: Color,
    pub stroke_width: f64,
    /// Side of a corner handle square in screen pixels
    pub handle_size: f64,
}

impl Default for AnnotationPalette {
    fn default() -> Self {
        Self {
            draft: Rgba([255, 200, 0, 255]),
            submitted: Rgba([0, 200, 120, 255]),
            selected: Rgba([60, 160, 255, 255]),
            unsynced: Rgba([255, 70, 50, 255]),
            measurement: Rgba([0, 220, 255, 255]),
            rubber_band: Rgba([255, 255, 255, 200]),
            label: Rgba([255, 255, 255, 255]),
            stroke_width: 2.0,
            handle_size: 8.0,
        }
    }
}

impl AnnotationPalette {
    fn outline(&self, annotation: &Annotation, class_color: Option<Color>, selected: bool) -> StrokeStyle {
        let color = if annotation.sync_state == SyncState::Unsynced {
            self.unsynced
        } else if selected {
            self.selected
        } else if annotation.is_draft() {
            self.draft
        } else {
            class_color.unwrap_or(self.submitted)
        };
        if annotation.is_draft() {
            StrokeStyle::dashed(color, self.stroke_width, 6.0, 4.0)
        } else {
            StrokeStyle::solid(color, self.stroke_width)
        }
    }
}

/// Draw measurements, annotations and the in-progress drag on top of the tiles
pub fn draw_annotations(
    surface: &mut dyn DrawSurface,
    camera: &Camera,
    engine: &AnnotationEngine,
    palette: &AnnotationPalette,
) {
    let selected = engine.selected();
    let lookup = engine.class_lookup();

    for annotation in engine.annotations() {
        let rect = camera.world_rect_to_screen(&annotation.bbox);
        let class = annotation.class_id.and_then(|id| lookup.class(id));
        let is_selected = selected == Some(annotation.id);
        let style = palette.outline(annotation, class.as_ref().and_then(|c| c.rgba()), is_selected);
        surface.stroke_rect(rect, &style);

        let name = class
            .map(|c| c.name)
            .or_else(|| annotation.class_name.clone());
        let label = match (name, annotation.sync_state) {
            (Some(name), SyncState::Unsynced) => format!("{name} (unsynced)"),
            (Some(name), _) => name,
            (None, SyncState::Unsynced) => "unsynced".to_string(),
            (None, _) => String::new(),
        };
        if !label.is_empty() {
            surface.draw_label(Point::new(rect.x, rect.y - 14.0), &label, style.color);
        }
        if is_selected {
            draw_handles(surface, &rect, palette);
        }
    }

    for measurement in engine.measurements() {
        let rect = camera.world_rect_to_screen(&measurement.rect);
        surface.stroke_rect(rect, &StrokeStyle::solid(palette.measurement, palette.stroke_width));
        surface.draw_label(
            Point::new(rect.x, rect.bottom() + 4.0),
            &measurement.label(),
            palette.label,
        );
    }

    let pending = engine.drawing_rect().or_else(|| engine.pending_mark_rect());
    if let Some(world) = pending {
        let rect = camera.world_rect_to_screen(&world);
        surface.stroke_rect(
            rect,
            &StrokeStyle::dashed(palette.rubber_band, 1.0, 4.0, 4.0),
        );
    }
}

fn draw_handles(surface: &mut dyn DrawSurface, rect: &Rect, palette: &AnnotationPalette) {
    for handle in Handle::ALL {
        let center = handle.position(rect);
        surface.fill_rect(
            Rect::from_center_and_size(center, palette.handle_size, palette.handle_size),
            palette.selected,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::classes::{DefectClass, StaticClassTable};
    use crate::annotation::engine::DrawMode;
    use crate::annotation::model::AnnotationContext;
    use crate::annotation::store::InMemoryAnnotationStore;
    use crate::core::config::AnnotationOptions;
    use crate::prelude::{Arc, Instant};
    use crate::rendering::surface::{DrawCommand, RecordingSurface};
    use crate::runtime::InlineSpawner;
    use crate::tiles::key::Surface;

    #[test]
    fn test_draft_is_dashed_and_selection_has_handles() {
        let classes = StaticClassTable::new(vec![DefectClass::new(1, "scratch").with_color("#ff0000")]);
        let mut engine = AnnotationEngine::new(
            AnnotationOptions::default(),
            Arc::new(InMemoryAnnotationStore::new()),
            Arc::new(classes),
            Arc::new(InlineSpawner),
        );
        let now = Instant::now();
        engine.set_context(AnnotationContext::new("L", 1, Surface::Top), now);
        engine.poll(now);
        engine.set_mode(DrawMode::Mark);
        engine.set_default_class(Some(DefectClass::new(1, "scratch")));
        engine.pointer_down(Point::new(10.0, 10.0), 1.0);
        engine.pointer_up(Point::new(50.0, 30.0), now);

        let camera = Camera::new(0.0, 0.0, 2.0);
        let palette = AnnotationPalette::default();
        let mut surface = RecordingSurface::new(200.0, 200.0);
        draw_annotations(&mut surface, &camera, &engine, &palette);

        let strokes: Vec<&StrokeStyle> = surface
            .commands()
            .iter()
            .filter_map(|c| match c {
                DrawCommand::StrokeRect { rect, style } => {
                    assert_eq!(*rect, Rect::new(20.0, 20.0, 80.0, 40.0));
                    Some(style)
                }
                _ => None,
            })
            .collect();
        assert_eq!(strokes.len(), 1);
        assert!(strokes[0].is_dashed());
        assert_eq!(surface.labels(), vec!["scratch"]);
        assert_eq!(surface.fills_of(palette.selected), 0);

        // Clicking the body selects it; four handles are drawn
        engine.pointer_down(Point::new(30.0, 20.0), 2.0);
        engine.pointer_up(Point::new(30.0, 20.0), now);
        let mut surface = RecordingSurface::new(200.0, 200.0);
        draw_annotations(&mut surface, &camera, &engine, &palette);
        assert_eq!(surface.fills_of(palette.selected), 4);
    }
}
