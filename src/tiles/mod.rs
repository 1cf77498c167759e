pub mod bitmap;
pub mod cache;
pub mod key;
pub mod loader;
pub mod source;
pub mod tiling;

// Re-exports for convenience
pub use bitmap::TileBitmap;
pub use cache::{BitmapCache, CacheStats};
pub use key::{MosaicView, Surface, TileFormat, TileKey, TileRequest};
pub use loader::{TileLoader, TileLoaderConfig};
pub use source::{HttpTileSupplier, TileSupplier};
pub use tiling::{TileDescriptor, TileGrid};
