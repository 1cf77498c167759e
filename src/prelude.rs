//! Prelude module for common mosaic-viewer types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use mosaic_viewer::prelude::*;`

pub use crate::core::{
    camera::Camera,
    config::{
        AnnotationOptions, FitMode, InitialScale, Orientation, PreheatOptions, ViewerOptions,
        ViewerProfile, WheelMode,
    },
    geometry::{Point, Rect},
    viewport::ViewportController,
};

pub use crate::tiles::{
    bitmap::TileBitmap,
    cache::BitmapCache,
    key::{MosaicView, Surface, TileFormat, TileKey},
    loader::{TileLoader, TileLoaderConfig},
    source::{HttpTileSupplier, TileSupplier},
    tiling::{TileDescriptor, TileGrid},
};

pub use crate::input::{
    events::{InputEvent, KeyCode, KeyModifiers, MouseButton, ViewerEvent},
    handler::{Action, InputHandler},
};

pub use crate::annotation::{
    classes::{DefectClass, DefectClassLookup, StaticClassTable},
    engine::{AnnotationEngine, DrawMode},
    model::{Annotation, AnnotationContext, AnnotationStatus, SyncState},
    store::{AnnotationApi, InMemoryAnnotationStore},
};

pub use crate::prefetch::{history::ActionHistory, scheduler::PreheatScheduler};

pub use crate::rendering::{
    renderer::TileRenderer,
    surface::{DrawSurface, RasterSurface, RecordingSurface},
};

pub use crate::runtime::{spawn, AsyncSpawner, InlineSpawner, SharedSpawner};

#[cfg(feature = "tokio-runtime")]
pub use crate::runtime::TokioSpawner;

pub use crate::viewer::{ImageInfo, MosaicViewer};

pub use crate::{Error as ViewerError, Result};

pub use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
