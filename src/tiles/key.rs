//! Identity types shared by the tile cache, loader and preheat scheduler

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which face of the steel plate a mosaic was captured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Top,
    Bottom,
}

impl Surface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Top => "top",
            Surface::Bottom => "bottom",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoding requested from the tile server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
}

impl TileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Jpeg => "jpg",
            TileFormat::Png => "png",
            TileFormat::Webp => "webp",
        }
    }
}

/// Camera channel ("view") a mosaic was assembled from; opaque to the viewer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MosaicView(pub String);

impl MosaicView {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Cache key of one tile bitmap.
///
/// The same tuple is used by the renderer, the loader and the preheat
/// scheduler so that all three agree on tile identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub surface: Surface,
    pub sequence_id: u64,
    pub level: u32,
    pub tile_x: u32,
    pub tile_y: u32,
    pub tile_size: u32,
}

impl TileKey {
    pub fn new(
        surface: Surface,
        sequence_id: u64,
        level: u32,
        tile_x: u32,
        tile_y: u32,
        tile_size: u32,
    ) -> Self {
        Self {
            surface,
            sequence_id,
            level,
            tile_x,
            tile_y,
            tile_size,
        }
    }

    /// Key of the tile at `level` that covers this tile's footprint.
    ///
    /// Returns `None` when `level` is not coarser than this tile.
    pub fn ancestor(&self, level: u32) -> Option<TileKey> {
        if level <= self.level {
            return None;
        }
        let shift = level - self.level;
        if shift >= 32 {
            return Some(TileKey { level, tile_x: 0, tile_y: 0, ..*self });
        }
        Some(TileKey {
            level,
            tile_x: self.tile_x >> shift,
            tile_y: self.tile_y >> shift,
            ..*self
        })
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/L{}/{}x{}@{}",
            self.surface, self.sequence_id, self.level, self.tile_x, self.tile_y, self.tile_size
        )
    }
}

/// Everything the tile supplier needs to address one tile
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRequest {
    pub key: TileKey,
    pub format: TileFormat,
    pub view: Option<MosaicView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ancestor_key() {
        let key = TileKey::new(Surface::Top, 7, 0, 5, 3, 512);
        let parent = key.ancestor(1).unwrap();
        assert_eq!((parent.tile_x, parent.tile_y, parent.level), (2, 1, 1));
        let grand = key.ancestor(2).unwrap();
        assert_eq!((grand.tile_x, grand.tile_y), (1, 0));
        assert!(key.ancestor(0).is_none());
    }

    #[test]
    fn test_surface_serializes_lowercase() {
        let json = serde_json::to_string(&Surface::Bottom).unwrap();
        assert_eq!(json, "\"bottom\"");
    }
}
