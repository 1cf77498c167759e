use crate::animation::{EasingType, ZoomAnimation};
use crate::core::camera::Camera;
use crate::core::config::{FitMode, InitialScale, ViewerOptions};
use crate::core::constants::FOCUS_MARGIN;
use crate::core::geometry::{Point, Rect};
use crate::input::events::ViewerEvent;
use crate::prelude::{Duration, Instant};

/// Rate limiter for viewport/transform notifications.
///
/// Changes are coalesced; at most one emission happens per interval and the
/// last change is always flushed once the interval has passed.
#[derive(Debug, Clone)]
pub struct EventThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
    dirty: bool,
}

impl EventThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            dirty: false,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns true when a pending change may be emitted at `now`
    pub fn should_emit(&mut self, now: Instant) -> bool {
        if !self.dirty {
            return false;
        }
        let ready = self
            .last_emit
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if ready {
            self.dirty = false;
            self.last_emit = Some(now);
        }
        ready
    }
}

/// Owns the camera and enforces its scale and pan bounds.
///
/// All coordinates are in display orientation; the renderer converts to
/// storage orientation at the draw boundary. After every public operation
/// `scale` lies in `[min_scale, max_scale]` and, when a pan margin is set,
/// the translation lies inside the pan bounds.
#[derive(Debug, Clone)]
pub struct ViewportController {
    camera: Camera,
    container_width: f64,
    container_height: f64,
    image_width: f64,
    image_height: f64,
    fit_mode: FitMode,
    locked_scale: bool,
    max_zoom_scale: f64,
    pan_margin: Option<f64>,
    forced_scale: Option<f64>,
    initial_scale: InitialScale,
    zoom_duration: Duration,
    zoom_easing: EasingType,
    min_scale: f64,
    max_scale: f64,
    animation: Option<ZoomAnimation>,
    throttle: EventThrottle,
}

impl ViewportController {
    pub fn new(options: &ViewerOptions) -> Self {
        let mut controller = Self {
            camera: Camera::default(),
            container_width: 0.0,
            container_height: 0.0,
            image_width: 0.0,
            image_height: 0.0,
            fit_mode: options.fit_mode,
            locked_scale: options.locked_scale,
            max_zoom_scale: options.max_zoom_scale,
            pan_margin: options.pan_margin_px,
            forced_scale: options.forced_scale,
            initial_scale: options.initial_scale,
            zoom_duration: options.zoom_animation_duration(),
            zoom_easing: options.zoom_easing,
            min_scale: 1.0,
            max_scale: 1.0,
            animation: None,
            throttle: EventThrottle::new(options.event_throttle()),
        };
        controller.update_scale_bounds();
        controller
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    pub fn scale(&self) -> f64 {
        self.camera.scale
    }

    pub fn scale_bounds(&self) -> (f64, f64) {
        (self.min_scale, self.max_scale)
    }

    pub fn container_size(&self) -> (f64, f64) {
        (self.container_width, self.container_height)
    }

    pub fn image_size(&self) -> (f64, f64) {
        (self.image_width, self.image_height)
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    pub fn forced_scale(&self) -> Option<f64> {
        self.forced_scale
    }

    /// Visible world rectangle in display coordinates
    pub fn visible_rect(&self) -> Rect {
        self.camera
            .visible_rect(self.container_width, self.container_height)
    }

    pub fn screen_to_world(&self, screen: Point) -> Point {
        self.camera.screen_to_world(screen)
    }

    pub fn world_to_screen(&self, world: Point) -> Point {
        self.camera.world_to_screen(world)
    }

    fn container_center(&self) -> Point {
        Point::new(self.container_width / 2.0, self.container_height / 2.0)
    }

    /// Scale at which the image fits the container per the fit mode
    pub fn fit_scale(&self) -> f64 {
        let image_w = self.image_width.max(1.0);
        let image_h = self.image_height.max(1.0);
        let by_width = self.container_width / image_w;
        let by_height = self.container_height / image_h;
        let fit = match self.fit_mode {
            FitMode::Width => by_width,
            FitMode::Height => by_height,
            FitMode::Both => by_width.min(by_height),
        };
        if fit.is_finite() && fit > 0.0 {
            fit
        } else {
            1.0
        }
    }

    fn update_scale_bounds(&mut self) {
        let fit = self.fit_scale();
        let (min, max) = if let Some(forced) = self.forced_scale {
            (forced, forced)
        } else if self.locked_scale {
            (fit, fit)
        } else {
            (fit, self.max_zoom_scale)
        };
        if min > max {
            let mid = (min + max) / 2.0;
            self.min_scale = mid;
            self.max_scale = mid;
        } else {
            self.min_scale = min;
            self.max_scale = max;
        }
    }

    fn clamp_scale(&self, scale: f64) -> f64 {
        if !scale.is_finite() || scale <= 0.0 {
            return self.min_scale;
        }
        scale.clamp(self.min_scale, self.max_scale)
    }

    /// Allowed range for one translate axis; inverted ranges collapse to the midpoint
    fn pan_range(container: f64, content: f64, margin: f64) -> (f64, f64) {
        let lower = container - margin - content;
        let upper = margin;
        if lower > upper {
            let mid = (lower + upper) / 2.0;
            (mid, mid)
        } else {
            (lower, upper)
        }
    }

    fn clamp_pan(&mut self) {
        let Some(margin) = self.pan_margin else {
            return;
        };
        let s = self.camera.scale;
        let (min_x, max_x) = Self::pan_range(self.container_width, self.image_width * s, margin);
        let (min_y, max_y) = Self::pan_range(self.container_height, self.image_height * s, margin);
        self.camera.translate_x = self.camera.translate_x.clamp(min_x, max_x);
        self.camera.translate_y = self.camera.translate_y.clamp(min_y, max_y);
    }

    fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
        self.clamp_pan();
        self.throttle.mark_dirty();
    }

    /// Scale around a screen point, keeping the world point under it fixed
    fn scale_around(&mut self, screen: Point, scale: f64) {
        let world = self.camera.screen_to_world(screen);
        let scale = self.clamp_scale(scale);
        self.set_camera(Camera::anchored(world, screen, scale));
    }

    pub fn set_container_size(&mut self, width: f64, height: f64) {
        let center_world = self.camera.screen_to_world(self.container_center());
        self.container_width = width.max(0.0);
        self.container_height = height.max(0.0);
        self.update_scale_bounds();
        let scale = self.clamp_scale(self.camera.scale);
        self.set_camera(Camera::anchored(center_world, self.container_center(), scale));
    }

    /// Switch to a new image and reset to the initial view
    pub fn set_image_size(&mut self, width: f64, height: f64) {
        self.image_width = width.max(0.0);
        self.image_height = height.max(0.0);
        self.update_scale_bounds();
        self.reset_view();
    }

    /// Apply the configured initial scale, centred on the image
    pub fn reset_view(&mut self) {
        self.animation = None;
        let scale = match self.initial_scale {
            InitialScale::Fit => self.fit_scale(),
            InitialScale::Fixed(scale) => scale,
        };
        let scale = self.clamp_scale(scale);
        let center = Point::new(self.image_width / 2.0, self.image_height / 2.0);
        self.set_camera(Camera::anchored(center, self.container_center(), scale));
    }

    pub fn set_max_zoom_scale(&mut self, max_zoom_scale: f64) {
        self.max_zoom_scale = max_zoom_scale;
        self.refresh_bounds();
    }

    pub fn set_locked_scale(&mut self, locked: bool) {
        self.locked_scale = locked;
        self.refresh_bounds();
    }

    pub fn set_pan_margin(&mut self, margin: Option<f64>) {
        self.pan_margin = margin;
        let camera = self.camera;
        self.set_camera(camera);
    }

    /// Pin the scale (multi-viewer sync); `None` restores interactive zoom
    pub fn set_forced_scale(&mut self, scale: Option<f64>) {
        self.forced_scale = scale.filter(|s| s.is_finite() && *s > 0.0);
        if scale.is_some() && self.forced_scale.is_none() {
            log::warn!("ignoring invalid forced scale {scale:?}");
        }
        self.animation = None;
        self.refresh_bounds();
    }

    fn refresh_bounds(&mut self) {
        self.update_scale_bounds();
        let center = self.container_center();
        self.scale_around(center, self.camera.scale);
    }

    /// Translate the camera by a screen-pixel delta
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }
        self.animation = None;
        let mut camera = self.camera;
        camera.translate_x += dx;
        camera.translate_y += dy;
        self.set_camera(camera);
    }

    /// Zoom by `factor` keeping the world point under `screen` in place.
    ///
    /// Ignored while a forced scale is active. Returns whether the scale changed.
    pub fn zoom_at(&mut self, screen: Point, factor: f64) -> bool {
        if self.forced_scale.is_some() || !factor.is_finite() || factor <= 0.0 {
            return false;
        }
        self.animation = None;
        let before = self.camera.scale;
        self.scale_around(screen, before * factor);
        (self.camera.scale - before).abs() > f64::EPSILON
    }

    /// Zoom by `factor` around the container centre
    pub fn zoom_center(&mut self, factor: f64) -> bool {
        self.zoom_at(self.container_center(), factor)
    }

    /// Start an eased zoom; any running animation is replaced
    pub fn animate_zoom_to(
        &mut self,
        target_scale: f64,
        screen: Point,
        duration: Duration,
        now: Instant,
    ) {
        if self.forced_scale.is_some() {
            return;
        }
        let target = self.clamp_scale(target_scale);
        if duration.is_zero() {
            self.animation = None;
            self.scale_around(screen, target);
            return;
        }
        self.animation = Some(ZoomAnimation::with_easing(
            self.camera,
            target,
            screen,
            duration,
            now,
            self.zoom_easing,
        ));
    }

    /// Double-click behaviour: animate to max scale, or back to fit when already there
    pub fn toggle_zoom(&mut self, screen: Point, now: Instant) {
        let fit = self.clamp_scale(self.fit_scale());
        let target = if self.camera.scale < self.max_scale * 0.999 {
            self.max_scale
        } else {
            fit
        };
        self.animate_zoom_to(target, screen, self.zoom_duration, now);
    }

    /// Advance the running animation; returns true while the camera is moving
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(animation) = &self.animation else {
            return false;
        };
        let frame = animation.sample(now);
        if frame.finished {
            self.animation = None;
        }
        let mut camera = frame.camera;
        camera.scale = self.clamp_scale(camera.scale);
        self.set_camera(camera);
        true
    }

    /// Fit `rect` (world) into the view with a margin and centre it
    pub fn focus_on(&mut self, rect: &Rect) {
        self.animation = None;
        let padded = 1.0 + 2.0 * FOCUS_MARGIN;
        let width = rect.width.max(1.0) * padded;
        let height = rect.height.max(1.0) * padded;
        let scale = if self.forced_scale.is_some() {
            self.camera.scale
        } else {
            (self.container_width.max(1.0) / width).min(self.container_height.max(1.0) / height)
        };
        let scale = self.clamp_scale(scale);
        self.set_camera(Camera::anchored(rect.center(), self.container_center(), scale));
    }

    /// Keep the scale and centre the view on `world`
    pub fn pan_to_point(&mut self, world: Point) {
        self.animation = None;
        let scale = self.camera.scale;
        self.set_camera(Camera::anchored(world, self.container_center(), scale));
    }

    /// Throttled viewport/transform notifications due at `now`
    pub fn poll_events(&mut self, now: Instant) -> Vec<ViewerEvent> {
        if !self.throttle.should_emit(now) {
            return Vec::new();
        }
        vec![
            ViewerEvent::ViewportChanged(self.visible_rect()),
            ViewerEvent::TransformChanged {
                x: self.camera.translate_x,
                y: self.camera.translate_y,
                scale: self.camera.scale,
            },
        ]
    }

    /// True when a change is waiting for the throttle window
    pub fn has_pending_events(&self) -> bool {
        self.throttle.is_dirty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> ViewportController {
        let mut vp = ViewportController::new(&ViewerOptions::default());
        vp.set_container_size(800.0, 600.0);
        vp.set_image_size(16384.0, 1024.0);
        vp
    }

    fn assert_invariant(vp: &ViewportController) {
        let (min, max) = vp.scale_bounds();
        assert!(min <= max);
        assert!(vp.scale() >= min - 1e-12 && vp.scale() <= max + 1e-12);
    }

    #[test]
    fn test_initial_fit() {
        let vp = controller();
        let fit = 800.0 / 16384.0;
        assert!((vp.scale() - fit).abs() < 1e-12);
        assert_eq!(vp.scale_bounds(), (fit, 4.0));
        // Image centre sits at the container centre
        let c = vp.world_to_screen(Point::new(8192.0, 512.0));
        assert!((c.x - 400.0).abs() < 1e-9 && (c.y - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_to_cursor_invariant() {
        let mut vp = controller();
        vp.pan_by(-37.0, 12.5);
        for (x, y, factor) in [
            (10.0, 20.0, 1.7),
            (799.0, 0.0, 3.0),
            (400.0, 300.0, 0.5),
            (123.0, 456.0, 10.0),
            (0.0, 0.0, 0.2),
        ] {
            let screen = Point::new(x, y);
            let world = vp.screen_to_world(screen);
            vp.zoom_at(screen, factor);
            let back = vp.world_to_screen(world);
            assert!((back.x - x).abs() < 1e-6, "x drift at factor {factor}");
            assert!((back.y - y).abs() < 1e-6, "y drift at factor {factor}");
            assert_invariant(&vp);
        }
    }

    #[test]
    fn test_scale_is_clamped() {
        let mut vp = controller();
        vp.zoom_at(Point::new(0.0, 0.0), 1e9);
        assert_eq!(vp.scale(), 4.0);
        vp.zoom_at(Point::new(0.0, 0.0), 1e-9);
        assert!((vp.scale() - 800.0 / 16384.0).abs() < 1e-12);
        assert!(!vp.zoom_at(Point::new(0.0, 0.0), f64::NAN));
    }

    #[test]
    fn test_inverted_scale_range_collapses_to_midpoint() {
        let options = ViewerOptions {
            max_zoom_scale: 0.5,
            ..ViewerOptions::default()
        };
        let mut vp = ViewportController::new(&options);
        vp.set_container_size(1000.0, 1000.0);
        vp.set_image_size(100.0, 100.0);
        // fit = 10, max = 0.5
        assert_eq!(vp.scale_bounds(), (5.25, 5.25));
        assert_eq!(vp.scale(), 5.25);
    }

    #[test]
    fn test_locked_scale_ignores_zoom() {
        let options = ViewerOptions {
            locked_scale: true,
            ..ViewerOptions::default()
        };
        let mut vp = ViewportController::new(&options);
        vp.set_container_size(800.0, 600.0);
        vp.set_image_size(1600.0, 600.0);
        assert!(!vp.zoom_at(Point::new(10.0, 10.0), 2.0));
        assert_eq!(vp.scale(), 0.5);
    }

    #[test]
    fn test_pan_margin_clamps_translation() {
        let options = ViewerOptions {
            pan_margin_px: Some(50.0),
            ..ViewerOptions::default()
        };
        let mut vp = ViewportController::new(&options);
        vp.set_container_size(800.0, 600.0);
        vp.set_image_size(16384.0, 1024.0);
        vp.zoom_at(Point::new(0.0, 0.0), 1e9);

        vp.pan_by(1e6, 1e6);
        assert_eq!(vp.camera().translate_x, 50.0);
        assert_eq!(vp.camera().translate_y, 50.0);

        vp.pan_by(-1e7, -1e7);
        assert_eq!(vp.camera().translate_x, 800.0 - 50.0 - 16384.0 * 4.0);
        assert_eq!(vp.camera().translate_y, 600.0 - 50.0 - 1024.0 * 4.0);
    }

    #[test]
    fn test_pan_range_inversion_averages() {
        // Content narrower than the container minus margins
        assert_eq!(ViewportController::pan_range(800.0, 100.0, 10.0), (350.0, 350.0));
    }

    #[test]
    fn test_focus_on_centres_with_margin() {
        let mut vp = controller();
        let target = Rect::new(1000.0, 100.0, 200.0, 100.0);
        vp.focus_on(&target);
        let expected = (800.0_f64 / (200.0 * 1.2)).min(600.0 / (100.0 * 1.2));
        assert!((vp.scale() - expected).abs() < 1e-12);
        let c = vp.world_to_screen(target.center());
        assert!((c.x - 400.0).abs() < 1e-9 && (c.y - 300.0).abs() < 1e-9);

        // Degenerate rects do not produce NaN
        vp.focus_on(&Rect::new(10.0, 10.0, 0.0, 0.0));
        assert!(vp.scale().is_finite());
        assert_invariant(&vp);
    }

    #[test]
    fn test_pan_to_point_keeps_scale() {
        let mut vp = controller();
        vp.zoom_at(Point::new(0.0, 0.0), 4.0);
        let scale = vp.scale();
        vp.pan_to_point(Point::new(5000.0, 700.0));
        assert_eq!(vp.scale(), scale);
        let c = vp.world_to_screen(Point::new(5000.0, 700.0));
        assert!((c.x - 400.0).abs() < 1e-9 && (c.y - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_animation_toggle_and_cancel() {
        let mut vp = controller();
        let t0 = Instant::now();
        vp.toggle_zoom(Point::new(400.0, 300.0), t0);
        assert!(vp.is_animating());

        vp.tick(t0 + Duration::from_millis(100));
        let mid = vp.scale();
        assert!(mid > vp.scale_bounds().0 && mid < 4.0);

        // A new request replaces the running animation
        vp.animate_zoom_to(1.0, Point::new(0.0, 0.0), Duration::from_millis(300), t0 + Duration::from_millis(100));
        vp.tick(t0 + Duration::from_millis(1000));
        assert!(!vp.is_animating());
        assert!((vp.scale() - 1.0).abs() < 1e-12);

        vp.zoom_at(Point::new(0.0, 0.0), 100.0);
        vp.toggle_zoom(Point::new(0.0, 0.0), t0);
        vp.tick(t0 + Duration::from_secs(1));
        assert!((vp.scale() - vp.fit_scale()).abs() < 1e-12);
    }

    #[test]
    fn test_forced_scale_pins_zoom() {
        let mut vp = controller();
        vp.set_forced_scale(Some(0.25));
        assert_eq!(vp.scale(), 0.25);
        assert!(!vp.zoom_at(Point::new(0.0, 0.0), 2.0));
        assert_eq!(vp.scale(), 0.25);
        vp.set_forced_scale(None);
        assert!(vp.zoom_at(Point::new(0.0, 0.0), 2.0));
    }

    #[test]
    fn test_events_are_throttled() {
        let mut vp = controller();
        let t0 = Instant::now();
        assert_eq!(vp.poll_events(t0).len(), 2);

        vp.pan_by(1.0, 0.0);
        assert!(vp.poll_events(t0 + Duration::from_millis(10)).is_empty());
        vp.pan_by(1.0, 0.0);
        assert!(vp.has_pending_events());

        let events = vp.poll_events(t0 + Duration::from_millis(80));
        assert!(matches!(events[0], ViewerEvent::ViewportChanged(_)));
        assert!(!vp.has_pending_events());
        assert!(vp.poll_events(t0 + Duration::from_millis(500)).is_empty());
    }
}
