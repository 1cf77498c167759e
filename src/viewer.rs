//! Per-instance viewer façade.
//!
//! [`MosaicViewer`] owns one camera, one tile renderer, one annotation engine
//! and one preheat scheduler. Hosts drive it like a game loop: feed input
//! through [`MosaicViewer::handle_input`], call [`MosaicViewer::frame`] once per
//! animation tick, then read [`MosaicViewer::drain_events`].

use crate::annotation::{
    draw_annotations, AnnotationApi, AnnotationContext, AnnotationEngine, AnnotationPalette,
    DefectClassLookup, DrawMode,
};
use crate::core::config::{CursorStyle, Orientation, ViewerOptions};
use crate::core::geometry::{Point, Rect};
use crate::core::viewport::ViewportController;
use crate::input::events::{EventHandled, InputEvent, KeyCode, MouseButton, ViewerEvent};
use crate::input::handler::{Action, InputHandler};
use crate::prefetch::history::UserActionKind;
use crate::prefetch::scheduler::PreheatScheduler;
use crate::prelude::{Arc, Instant};
use crate::rendering::renderer::{FrameStats, OverlayFn, TileRenderer};
use crate::rendering::surface::DrawSurface;
use crate::runtime::SharedSpawner;
use crate::tiles::key::{MosaicView, Surface};
use crate::tiles::source::TileSupplier;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Mosaic opened in a viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// Production line the sequence belongs to; scopes annotations
    pub line_key: String,
    pub surface: Surface,
    pub sequence_id: u64,
    /// Width of the mosaic as its tiles are stored
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub view: Option<MosaicView>,
}

impl ImageInfo {
    pub fn annotation_context(&self) -> AnnotationContext {
        AnnotationContext {
            line_key: self.line_key.clone(),
            sequence_id: self.sequence_id,
            surface: self.surface,
            view: self.view.clone(),
        }
    }
}

pub struct MosaicViewer {
    options: ViewerOptions,
    viewport: ViewportController,
    renderer: TileRenderer,
    input: InputHandler,
    annotations: AnnotationEngine,
    scheduler: PreheatScheduler,
    palette: AnnotationPalette,
    image: Option<ImageInfo>,
    events: Vec<ViewerEvent>,
    /// The annotation engine claimed the current pointer drag
    pointer_captured: bool,
    cursor: CursorStyle,
    /// Kind of camera movement since the last preheat observation
    pending_action: Option<UserActionKind>,
    /// Preheat the first frame after a new image without waiting for the throttle
    preheat_immediately: bool,
    last_stats: FrameStats,
}

impl MosaicViewer {
    pub fn new(
        options: ViewerOptions,
        supplier: Arc<dyn TileSupplier>,
        annotation_api: Arc<dyn AnnotationApi>,
        classes: Arc<dyn DefectClassLookup>,
        spawner: SharedSpawner,
    ) -> Result<Self> {
        options.validate()?;
        let viewport = ViewportController::new(&options);
        let renderer = TileRenderer::new(&options, Arc::clone(&supplier), Arc::clone(&spawner));
        let annotations = AnnotationEngine::new(
            options.annotation.clone(),
            annotation_api,
            classes,
            Arc::clone(&spawner),
        );
        let scheduler = PreheatScheduler::new(supplier, spawner, options.preheat.clone());
        Ok(Self {
            input: InputHandler::new(options.wheel_mode),
            cursor: options.cursor.unwrap_or(CursorStyle::Grab),
            options,
            viewport,
            renderer,
            annotations,
            scheduler,
            palette: AnnotationPalette::default(),
            image: None,
            events: Vec::new(),
            pointer_captured: false,
            pending_action: None,
            preheat_immediately: false,
            last_stats: FrameStats::default(),
        })
    }

    // ----- accessors -----

    pub fn options(&self) -> &ViewerOptions {
        &self.options
    }

    pub fn image(&self) -> Option<&ImageInfo> {
        self.image.as_ref()
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn renderer(&self) -> &TileRenderer {
        &self.renderer
    }

    pub fn annotations(&self) -> &AnnotationEngine {
        &self.annotations
    }

    pub fn annotations_mut(&mut self) -> &mut AnnotationEngine {
        &mut self.annotations
    }

    pub fn scheduler(&self) -> &PreheatScheduler {
        &self.scheduler
    }

    pub fn cursor(&self) -> CursorStyle {
        self.cursor
    }

    pub fn last_frame_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// LOD level tiles are drawn at for the current scale
    pub fn preferred_level(&self) -> Option<u32> {
        self.renderer.preferred_level(self.viewport.scale())
    }

    /// Visible world rectangle in display coordinates
    pub fn visible_rect(&self) -> Rect {
        self.viewport.visible_rect()
    }

    /// Events produced since the last call
    pub fn drain_events(&mut self) -> Vec<ViewerEvent> {
        std::mem::take(&mut self.events)
    }

    // ----- setup -----

    pub fn set_container_size(&mut self, width: f64, height: f64) {
        self.viewport.set_container_size(width, height);
        self.pending_action.get_or_insert(UserActionKind::Idle);
    }

    /// Open a mosaic: resets the view, the preheat state and the annotation
    /// context
    pub fn set_image(&mut self, info: ImageInfo, now: Instant) {
        log::info!(
            "opening {} sequence {} ({}x{}, {:?})",
            info.surface,
            info.sequence_id,
            info.width,
            info.height,
            info.orientation
        );
        self.renderer.set_orientation(info.orientation);
        self.renderer.set_view(info.view.clone());
        self.renderer
            .set_image(info.surface, info.sequence_id, info.width, info.height);
        let (display_w, display_h) = self.renderer.adapter().display_size(info.width, info.height);
        self.viewport.set_image_size(display_w, display_h);
        self.scheduler.reset();
        self.input.cancel();
        self.pointer_captured = false;
        self.annotations.set_context(info.annotation_context(), now);
        self.image = Some(info);
        self.preheat_immediately = true;
        self.pending_action = Some(UserActionKind::Idle);
    }

    pub fn set_overlay(&mut self, overlay: Option<OverlayFn>) {
        self.renderer.set_overlay(overlay);
    }

    pub fn set_palette(&mut self, palette: AnnotationPalette) {
        self.palette = palette;
    }

    pub fn set_draw_mode(&mut self, mode: DrawMode) {
        self.annotations.set_mode(mode);
        self.input.cancel();
        self.pointer_captured = false;
    }

    pub fn set_fixed_level(&mut self, level: Option<u32>) {
        self.renderer.set_fixed_level(level);
    }

    /// Pin the scale to keep several viewers in sync; `None` releases it
    pub fn set_forced_scale(&mut self, scale: Option<f64>) {
        self.viewport.set_forced_scale(scale);
        self.pending_action = Some(UserActionKind::Zoom);
    }

    // ----- camera commands -----

    pub fn focus_on(&mut self, rect: &Rect) {
        self.viewport.focus_on(rect);
        self.pending_action = Some(UserActionKind::Pan);
    }

    pub fn pan_to_point(&mut self, world: Point) {
        self.viewport.pan_to_point(world);
        self.pending_action = Some(UserActionKind::Pan);
    }

    // ----- input -----

    /// Route one input event: the annotation layer sees pointer input first,
    /// anything it does not claim drives the camera
    pub fn handle_input(&mut self, event: InputEvent, now: Instant) -> EventHandled {
        let scale = self.viewport.scale();
        let handled = match &event {
            InputEvent::PointerDown {
                position, button, ..
            } => {
                let world = self.viewport.screen_to_world(*position);
                self.events.push(ViewerEvent::PointerDown {
                    world,
                    screen: *position,
                });
                if *button == MouseButton::Left
                    && self.annotations.pointer_down(world, scale).is_handled()
                {
                    self.pointer_captured = true;
                    EventHandled::Handled
                } else {
                    self.apply_input(&event, now)
                }
            }
            InputEvent::PointerMove { position } => {
                let world = self.viewport.screen_to_world(*position);
                self.events.push(ViewerEvent::PointerMove {
                    world,
                    screen: *position,
                });
                let handled = if self.pointer_captured {
                    self.annotations.pointer_move(world)
                } else {
                    self.apply_input(&event, now)
                };
                self.update_cursor(world, scale);
                handled
            }
            InputEvent::PointerUp { position, .. } => {
                let world = self.viewport.screen_to_world(*position);
                let handled = if std::mem::take(&mut self.pointer_captured) {
                    self.annotations.pointer_up(world, now)
                } else {
                    self.apply_input(&event, now)
                };
                self.update_cursor(world, scale);
                handled
            }
            InputEvent::PointerLeave => {
                self.events.push(ViewerEvent::PointerLeave);
                if std::mem::take(&mut self.pointer_captured) {
                    self.annotations.cancel_interaction();
                }
                self.apply_input(&event, now)
            }
            InputEvent::KeyPress { key, .. } => match key {
                KeyCode::Delete | KeyCode::Backspace => {
                    if self.annotations.delete_selected(now) {
                        EventHandled::Handled
                    } else {
                        EventHandled::NotHandled
                    }
                }
                KeyCode::Escape => {
                    self.annotations.cancel_interaction();
                    self.input.cancel();
                    self.pointer_captured = false;
                    EventHandled::Handled
                }
                _ => self.apply_input(&event, now),
            },
            _ => self.apply_input(&event, now),
        };
        self.events.extend(self.annotations.take_events());
        handled
    }

    fn apply_input(&mut self, event: &InputEvent, now: Instant) -> EventHandled {
        let actions = self.input.handle_event(event);
        let handled = if actions.is_empty() && !self.input.is_dragging() {
            EventHandled::NotHandled
        } else {
            EventHandled::Handled
        };
        for action in actions {
            self.apply_action(action, now);
        }
        handled
    }

    fn apply_action(&mut self, action: Action, now: Instant) {
        let kind = match action {
            Action::Pan { dx, dy } => {
                self.viewport.pan_by(dx, dy);
                if self.input.is_dragging() {
                    UserActionKind::Drag
                } else {
                    UserActionKind::Pan
                }
            }
            Action::ZoomAt { focus, factor } => {
                self.viewport.zoom_at(focus, factor);
                UserActionKind::Zoom
            }
            Action::ZoomCenter { factor } => {
                self.viewport.zoom_center(factor);
                UserActionKind::Zoom
            }
            Action::ZoomToggle { focus } => {
                self.viewport.toggle_zoom(focus, now);
                UserActionKind::Zoom
            }
            Action::ResetView => {
                self.viewport.reset_view();
                UserActionKind::Zoom
            }
            Action::Resize { width, height } => {
                self.viewport.set_container_size(width, height);
                UserActionKind::Idle
            }
        };
        self.pending_action = Some(kind);
    }

    fn update_cursor(&mut self, world: Point, scale: f64) {
        self.cursor = match self.options.cursor {
            Some(cursor) => cursor,
            None if self.input.is_dragging() => CursorStyle::Grabbing,
            None => self.annotations.cursor_at(world, scale),
        };
    }

    // ----- frame -----

    /// Draw one frame at `now` and run the background bookkeeping
    pub fn frame(&mut self, now: Instant, surface: &mut dyn DrawSurface) -> FrameStats {
        if self.viewport.tick(now) {
            self.pending_action = Some(UserActionKind::Zoom);
        }
        self.annotations.poll(now);

        // One camera snapshot for tiles and overlays
        let camera = self.viewport.camera();
        let stats = self.renderer.render(&camera, surface, now);
        if self.annotations.mode() != DrawMode::None {
            draw_annotations(surface, &camera, &self.annotations, &self.palette);
        }
        if stats.level_changed && self.image.is_some() {
            self.events.push(ViewerEvent::PreferredLevelChanged(stats.level));
        }

        let viewport_events = self.viewport.poll_events(now);
        let viewport_moved = !viewport_events.is_empty();
        self.events.extend(viewport_events);
        // Flush what the previous frames queued before this frame re-arms the debounce
        self.scheduler.poll(now);
        if viewport_moved || self.preheat_immediately {
            self.preheat(now);
        }
        self.events.extend(self.annotations.take_events());
        self.last_stats = stats;
        stats
    }

    fn preheat(&mut self, now: Instant) {
        let Some(target) = self.renderer.target().copied() else {
            return;
        };
        let view = self.image.as_ref().and_then(|i| i.view.clone());
        let camera = self.viewport.camera();
        let (width, height) = self.viewport.container_size();
        let (_, tiles) = self.renderer.visible_tiles(&camera, width, height);
        let immediate = std::mem::take(&mut self.preheat_immediately);
        self.scheduler
            .preheat_visible(&target, view.clone(), &tiles, immediate, now);

        let kind = self.pending_action.take().unwrap_or(UserActionKind::Idle);
        let storage_rect = self.renderer.adapter().to_storage_rect(&self.viewport.visible_rect());
        self.scheduler
            .observe_viewport(&target, view, kind, storage_rect, camera.scale, now);
    }
}
