pub mod orientation;
pub mod renderer;
pub mod surface;

pub use orientation::OrientationAdapter;
pub use renderer::{FrameStats, OverlayContext, OverlayFn, TileRenderer};
pub use surface::{Color, DrawCommand, DrawSurface, RasterSurface, RecordingSurface, StrokeStyle};
