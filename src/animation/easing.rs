use serde::{Deserialize, Serialize};

pub fn ease_out_cubic(t: f64) -> f64 {
    EasingType::EaseOut.apply(t)
}

pub fn ease_in_out_cubic(t: f64) -> f64 {
    EasingType::EaseInOut.apply(t)
}

pub fn lerp(start: f64, end: f64, t: f64) -> f64 {
    start + (end - start) * t
}

/// Easing curve applied to a normalised animation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EasingType {
    Linear,
    EaseIn,
    /// Cubic ease-out, the viewer's zoom curve
    #[default]
    EaseOut,
    EaseInOut,
    Smooth,
}

impl EasingType {
    /// Apply easing function to a normalized time value (0.0 to 1.0)
    pub fn apply(self, t: f64) -> f64 {
        let t = if t.is_nan() { 1.0 } else { t.clamp(0.0, 1.0) };
        match self {
            EasingType::Linear => t,
            EasingType::EaseIn => t * t * t,
            EasingType::EaseOut => {
                let t = t - 1.0;
                t * t * t + 1.0
            }
            EasingType::EaseInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            // Smooth step (3t^2 - 2t^3)
            EasingType::Smooth => t * t * (3.0 - 2.0 * t),
        }
    }
}
