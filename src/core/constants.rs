//! Engine-wide defaults for the mosaic viewer.
//! Keeping them in a single place makes it easier to tweak the magic numbers.

/// Default square tile size in image pixels.
pub const TILE_SIZE: u32 = 512;

/// Smallest rectangle side (world units) that survives a drag.
pub const MIN_ANNOTATION_SIZE: f64 = 2.0;

/// Corner handle hit radius in screen pixels.
pub const HANDLE_TOLERANCE_PX: f64 = 8.0;

/// Margin added around a region passed to `focus_on`.
pub const FOCUS_MARGIN: f64 = 0.1;

/// Minimum spacing between viewport/transform event emissions.
pub const EVENT_THROTTLE_MS: u64 = 80;

/// Duration of the double-click zoom animation.
pub const ZOOM_ANIMATION_MS: u64 = 300;

/// Scale multiplier for one wheel notch or `+`/`-` key press.
pub const WHEEL_ZOOM_STEP: f64 = 1.2;

/// Upper scale limit when no override is configured.
pub const DEFAULT_MAX_SCALE: f64 = 4.0;

/// Prefetch margin around the visible area in screen pixels.
pub const PREFETCH_MARGIN_PX: f64 = 256.0;

/// Minimum interval between preheat bursts.
pub const PREHEAT_INTERVAL_MS: u64 = 200;

/// Debounce delay before a queued preheat batch is flushed.
pub const PREHEAT_DEBOUNCE_MS: u64 = 50;

/// Prediction confidence needed before a predictive preheat is issued.
pub const PREDICTION_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Prediction horizon as a multiple of the last inter-sample interval.
pub const PREDICTION_HORIZON_FACTOR: f64 = 1.5;
