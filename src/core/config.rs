//! Configuration system for viewer behaviour and tuning
//!
//! Options can be built from a preset profile, tweaked field by field, or
//! loaded from JSON. Every struct has a sensible `Default` so partial JSON
//! documents are accepted.

use crate::animation::EasingType;
use crate::core::constants;
use crate::prelude::Duration;
use crate::tiles::key::{MosaicView, TileFormat};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Starting scale when an image is opened
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InitialScale {
    #[default]
    Fit,
    Fixed(f64),
}

/// Which image extent the fit scale is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    Width,
    Height,
    #[default]
    Both,
}

/// What a plain wheel gesture does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WheelMode {
    #[default]
    Zoom,
    /// Wheel pans; ctrl+wheel zooms
    ScrollPan,
}

/// Display orientation of a mosaic relative to how its tiles are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Vertical,
    /// Stored transposed; axes are swapped at the draw boundary
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorStyle {
    Default,
    Grab,
    Grabbing,
    Crosshair,
    Move,
    ResizeNwse,
    ResizeNesw,
    Pointer,
}

/// Retry policy for annotation persistence calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.saturating_sub(1).min(20));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationOptions {
    /// Smallest width/height in world units that survives a drag
    pub min_size: f64,
    /// Corner handle radius in screen pixels
    pub handle_tolerance_px: f64,
    pub auto_submit: bool,
    pub retry: RetryPolicy,
}

impl Default for AnnotationOptions {
    fn default() -> Self {
        Self {
            min_size: constants::MIN_ANNOTATION_SIZE,
            handle_tolerance_px: constants::HANDLE_TOLERANCE_PX,
            auto_submit: false,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreheatOptions {
    pub enabled: bool,
    pub min_interval_ms: u64,
    pub debounce_ms: u64,
    pub max_batch_size: usize,
    pub max_queue_len: usize,
    pub history_len: usize,
    pub neighbor_radius: u32,
    pub include_cross_level: bool,
    /// Let the supplier expand the neighbour ring instead of listing it in
    /// every visible-tile batch
    pub adjacent_on_server: bool,
    pub confidence_threshold: f64,
    pub recent_ttl_ms: u64,
    pub recent_capacity: usize,
}

impl PreheatOptions {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn recent_ttl(&self) -> Duration {
        Duration::from_millis(self.recent_ttl_ms)
    }
}

impl Default for PreheatOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_ms: constants::PREHEAT_INTERVAL_MS,
            debounce_ms: constants::PREHEAT_DEBOUNCE_MS,
            max_batch_size: 64,
            max_queue_len: 32,
            history_len: 10,
            neighbor_radius: 1,
            include_cross_level: false,
            adjacent_on_server: false,
            confidence_threshold: constants::PREDICTION_CONFIDENCE_THRESHOLD,
            recent_ttl_ms: 30_000,
            recent_capacity: 4096,
        }
    }
}

/// Everything a viewer instance can be configured with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerOptions {
    pub tile_size: u32,
    /// Overrides the computed coarsest level
    pub max_level: Option<u32>,
    pub initial_scale: InitialScale,
    /// Always draw this level regardless of scale
    pub fixed_level: Option<u32>,
    /// Extra screen pixels of tiles loaded around the view
    pub prefetch_margin_px: f64,
    /// How far (screen px) the image edge may be dragged into the view
    pub pan_margin_px: Option<f64>,
    pub fit_mode: FitMode,
    pub locked_scale: bool,
    pub max_zoom_scale: f64,
    pub wheel_mode: WheelMode,
    /// Pins the scale, used to keep several viewers in sync
    pub forced_scale: Option<f64>,
    pub cursor: Option<CursorStyle>,
    pub orientation: Orientation,
    pub tile_format: TileFormat,
    pub view: Option<MosaicView>,
    pub event_throttle_ms: u64,
    pub zoom_animation_ms: u64,
    pub zoom_easing: EasingType,
    pub draw_surface_borders: bool,
    pub cache_max_tiles: usize,
    pub cache_max_bytes: usize,
    pub tile_max_attempts: u32,
    pub annotation: AnnotationOptions,
    pub preheat: PreheatOptions,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        ViewerProfile::default().resolve()
    }
}

impl ViewerOptions {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn event_throttle(&self) -> Duration {
        Duration::from_millis(self.event_throttle_ms)
    }

    pub fn zoom_animation_duration(&self) -> Duration {
        Duration::from_millis(self.zoom_animation_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(Error::InvalidConfig("tile_size must be positive".into()));
        }
        if !(self.max_zoom_scale.is_finite() && self.max_zoom_scale > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "max_zoom_scale must be positive, got {}",
                self.max_zoom_scale
            )));
        }
        if let InitialScale::Fixed(scale) = self.initial_scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "initial scale must be positive, got {scale}"
                )));
            }
        }
        if let Some(scale) = self.forced_scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "forced scale must be positive, got {scale}"
                )));
            }
        }
        if !self.prefetch_margin_px.is_finite() || self.prefetch_margin_px < 0.0 {
            return Err(Error::InvalidConfig("prefetch margin must be >= 0".into()));
        }
        if self.annotation.min_size < 0.0 {
            return Err(Error::InvalidConfig("annotation min_size must be >= 0".into()));
        }
        Ok(())
    }
}

/// Preset option bundles
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ViewerProfile {
    #[default]
    Balanced,
    /// Smaller caches and no speculative preheating
    LowBandwidth,
    HighQuality,
    Custom(Box<ViewerOptions>),
}

impl ViewerProfile {
    pub fn resolve(&self) -> ViewerOptions {
        let balanced = ViewerOptions {
            tile_size: constants::TILE_SIZE,
            max_level: None,
            initial_scale: InitialScale::Fit,
            fixed_level: None,
            prefetch_margin_px: constants::PREFETCH_MARGIN_PX,
            pan_margin_px: None,
            fit_mode: FitMode::Both,
            locked_scale: false,
            max_zoom_scale: constants::DEFAULT_MAX_SCALE,
            wheel_mode: WheelMode::Zoom,
            forced_scale: None,
            cursor: None,
            orientation: Orientation::Vertical,
            tile_format: TileFormat::Jpeg,
            view: None,
            event_throttle_ms: constants::EVENT_THROTTLE_MS,
            zoom_animation_ms: constants::ZOOM_ANIMATION_MS,
            zoom_easing: EasingType::EaseOut,
            draw_surface_borders: true,
            cache_max_tiles: 1024,
            cache_max_bytes: 256 * 1024 * 1024,
            tile_max_attempts: 4,
            annotation: AnnotationOptions::default(),
            preheat: PreheatOptions::default(),
        };

        match self {
            Self::Balanced => balanced,
            Self::LowBandwidth => ViewerOptions {
                prefetch_margin_px: 0.0,
                zoom_animation_ms: 0,
                cache_max_tiles: 256,
                cache_max_bytes: 64 * 1024 * 1024,
                tile_max_attempts: 2,
                preheat: PreheatOptions {
                    enabled: false,
                    ..PreheatOptions::default()
                },
                ..balanced
            },
            Self::HighQuality => ViewerOptions {
                prefetch_margin_px: 512.0,
                max_zoom_scale: 8.0,
                cache_max_tiles: 4096,
                cache_max_bytes: 1024 * 1024 * 1024,
                tile_format: TileFormat::Png,
                preheat: PreheatOptions {
                    neighbor_radius: 2,
                    include_cross_level: true,
                    max_batch_size: 128,
                    ..PreheatOptions::default()
                },
                ..balanced
            },
            Self::Custom(options) => options.as_ref().clone(),
        }
    }
}
