//! # mosaic-viewer
//!
//! Core of a deep-zoom tiled image viewer for steel-surface inspection mosaics.
//!
//! The crate renders arbitrarily large mosaics assembled from discrete image
//! tiles fetched on demand. It covers the camera and input handling, tile
//! visibility and level-of-detail selection, coarse-level fallback drawing,
//! the measurement/defect annotation state machine and a prefetch scheduler
//! that warms the tile server ahead of the user.

pub mod animation;
pub mod annotation;
pub mod core;
pub mod input;
pub mod prefetch;
pub mod prelude;
pub mod rendering;
pub mod runtime;
pub mod tiles;
pub mod viewer;

pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    camera::Camera,
    config::{ViewerOptions, ViewerProfile},
    geometry::{Point, Rect},
    viewport::ViewportController,
};

pub use annotation::{AnnotationEngine, DrawMode};
pub use input::events::{InputEvent, ViewerEvent};
pub use prefetch::scheduler::PreheatScheduler;
pub use rendering::{renderer::TileRenderer, surface::DrawSurface};
pub use tiles::{
    key::{Surface, TileKey},
    source::TileSupplier,
    tiling::TileDescriptor,
};
pub use viewer::MosaicViewer;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tile supplier error: {0}")]
    Supplier(String),

    #[error("Annotation persistence error: {0}")]
    Persistence(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}
