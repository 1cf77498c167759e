use super::easing::{lerp, EasingType};
use crate::core::camera::Camera;
use crate::core::geometry::Point;
use crate::prelude::{Duration, Instant};

/// Camera state sampled from a running animation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomFrame {
    pub camera: Camera,
    pub finished: bool,
}

/// Eased zoom towards a target scale, anchored at a screen point.
///
/// The world point under `anchor_screen` when the animation starts stays
/// under it for every intermediate frame. Scale is interpolated in log space
/// so zooming in and out feel symmetric.
#[derive(Debug, Clone)]
pub struct ZoomAnimation {
    start_time: Instant,
    duration: Duration,
    easing: EasingType,
    from_scale: f64,
    to_scale: f64,
    anchor_world: Point,
    anchor_screen: Point,
}

impl ZoomAnimation {
    pub fn new(
        from: Camera,
        to_scale: f64,
        anchor_screen: Point,
        duration: Duration,
        start_time: Instant,
    ) -> Self {
        Self::with_easing(
            from,
            to_scale,
            anchor_screen,
            duration,
            start_time,
            EasingType::EaseOut,
        )
    }

    pub fn with_easing(
        from: Camera,
        to_scale: f64,
        anchor_screen: Point,
        duration: Duration,
        start_time: Instant,
        easing: EasingType,
    ) -> Self {
        Self {
            start_time,
            duration,
            easing,
            from_scale: from.scale,
            to_scale,
            anchor_world: from.screen_to_world(anchor_screen),
            anchor_screen,
        }
    }

    pub fn target_scale(&self) -> f64 {
        self.to_scale
    }

    /// Normalised progress in `[0, 1]`
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start_time);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    pub fn sample(&self, now: Instant) -> ZoomFrame {
        let t = self.progress(now);
        let eased = self.easing.apply(t);
        let scale = if self.from_scale > 0.0 && self.to_scale > 0.0 {
            lerp(self.from_scale.ln(), self.to_scale.ln(), eased).exp()
        } else {
            lerp(self.from_scale, self.to_scale, eased)
        };
        ZoomFrame {
            camera: Camera::anchored(self.anchor_world, self.anchor_screen, scale),
            finished: t >= 1.0,
        }
    }
}
