//! Tile visibility and level-of-detail math.
//!
//! Everything here is a pure function of its inputs. The renderer and the
//! preheat scheduler both go through this module so that the tile keys they
//! produce always agree.

use crate::core::geometry::Rect;
use crate::tiles::key::{Surface, TileKey};
use serde::{Deserialize, Serialize};

/// One tile footprint in world coordinates (storage orientation)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileDescriptor {
    pub level: u32,
    pub row: u32,
    pub col: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl TileDescriptor {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn key(&self, surface: Surface, sequence_id: u64, tile_size: u32) -> TileKey {
        TileKey::new(surface, sequence_id, self.level, self.col, self.row, tile_size)
    }
}

/// Default coarsest level: `ceil(log2(extent / tile_size))`, never negative.
///
/// `extent` is the long side of the mosaic, which is the display width of a
/// strip whichever way it is stored.
pub fn compute_max_level(extent: f64, tile_size: u32) -> u32 {
    let ratio = extent.max(1.0) / f64::from(tile_size.max(1));
    if ratio <= 1.0 {
        return 0;
    }
    ratio.log2().ceil() as u32
}

/// Level whose native resolution best matches `scale`.
///
/// `level = clamp(floor(log2(1 / scale)), 0, max_level)`; non-increasing as
/// `scale` grows.
pub fn compute_preferred_level(scale: f64, max_level: u32) -> u32 {
    if !scale.is_finite() || scale <= 0.0 {
        return max_level;
    }
    let raw = (1.0 / scale).log2().floor();
    if raw <= 0.0 {
        0
    } else {
        (raw as u32).min(max_level)
    }
}

/// World size covered by one tile at `level`
pub fn virtual_tile_size(tile_size: u32, level: u32) -> f64 {
    f64::from(tile_size.max(1)) * 2_f64.powi(level.min(62) as i32)
}

/// Tile pyramid over one mosaic image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    pub image_width: f64,
    pub image_height: f64,
    pub tile_size: u32,
    pub max_level: u32,
}

impl TileGrid {
    /// Grid with the default maximum level for the image's long side
    pub fn new(image_width: f64, image_height: f64, tile_size: u32) -> Self {
        Self {
            image_width,
            image_height,
            tile_size,
            max_level: compute_max_level(image_width.max(image_height), tile_size),
        }
    }

    pub fn with_max_level(mut self, max_level: Option<u32>) -> Self {
        if let Some(level) = max_level {
            self.max_level = level;
        }
        self
    }

    pub fn image_bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.image_width.max(0.0), self.image_height.max(0.0))
    }

    /// Resolves the level to draw at: a forced level wins, otherwise LOD from scale
    pub fn resolve_level(&self, scale: f64, forced_level: Option<u32>) -> u32 {
        match forced_level {
            Some(level) => level.min(self.max_level),
            None => compute_preferred_level(scale, self.max_level),
        }
    }

    /// Number of tile columns and rows at `level`
    pub fn dimensions(&self, level: u32) -> (u32, u32) {
        let vts = virtual_tile_size(self.tile_size, level);
        let cols = (self.image_width.max(0.0) / vts).ceil() as u32;
        let rows = (self.image_height.max(0.0) / vts).ceil() as u32;
        (cols, rows)
    }

    /// Descriptor for grid cell (`col`, `row`), clipped to the image bounds
    pub fn descriptor(&self, level: u32, col: u32, row: u32) -> Option<TileDescriptor> {
        let (cols, rows) = self.dimensions(level);
        if col >= cols || row >= rows {
            return None;
        }
        let vts = virtual_tile_size(self.tile_size, level);
        let x = f64::from(col) * vts;
        let y = f64::from(row) * vts;
        Some(TileDescriptor {
            level,
            row,
            col,
            x,
            y,
            width: vts.min(self.image_width - x),
            height: vts.min(self.image_height - y),
        })
    }

    /// Minimal set of tiles at `level` covering `rect ∩ image bounds`.
    ///
    /// Tiles come out row-major. Edge tiles are clipped to the image rather
    /// than overhanging it.
    pub fn tiles_in_rect(&self, rect: &Rect, level: u32) -> Vec<TileDescriptor> {
        let Some(clipped) = rect.intersection(&self.image_bounds()) else {
            return Vec::new();
        };
        let level = level.min(self.max_level);
        let vts = virtual_tile_size(self.tile_size, level);
        let (cols, rows) = self.dimensions(level);
        if cols == 0 || rows == 0 {
            return Vec::new();
        }

        let col_start = (clipped.x / vts).floor().max(0.0) as u32;
        let row_start = (clipped.y / vts).floor().max(0.0) as u32;
        let col_end = ((clipped.right() / vts).ceil() as u32).clamp(1, cols) - 1;
        let row_end = ((clipped.bottom() / vts).ceil() as u32).clamp(1, rows) - 1;

        let capacity = ((col_end + 1).saturating_sub(col_start) as usize)
            * ((row_end + 1).saturating_sub(row_start) as usize);
        let mut tiles = Vec::with_capacity(capacity);
        for row in row_start..=row_end {
            for col in col_start..=col_end {
                if let Some(tile) = self.descriptor(level, col, row) {
                    tiles.push(tile);
                }
            }
        }
        tiles
    }

    /// Same-level tiles within `radius` cells of `tile`, excluding the tile itself
    pub fn neighbors(&self, tile: &TileDescriptor, radius: u32) -> Vec<TileDescriptor> {
        let radius = i64::from(radius);
        let mut out = Vec::new();
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let col = i64::from(tile.col) + dx;
                let row = i64::from(tile.row) + dy;
                if col < 0 || row < 0 {
                    continue;
                }
                if let Some(n) = self.descriptor(tile.level, col as u32, row as u32) {
                    out.push(n);
                }
            }
        }
        out
    }

    /// The coarser tile covering `tile`, if one exists below `max_level`
    pub fn parent(&self, tile: &TileDescriptor) -> Option<TileDescriptor> {
        if tile.level >= self.max_level {
            return None;
        }
        self.descriptor(tile.level + 1, tile.col / 2, tile.row / 2)
    }

    /// The up to four finer tiles covering `tile`
    pub fn children(&self, tile: &TileDescriptor) -> Vec<TileDescriptor> {
        if tile.level == 0 {
            return Vec::new();
        }
        let level = tile.level - 1;
        let mut out = Vec::with_capacity(4);
        for dy in 0..2 {
            for dx in 0..2 {
                if let Some(child) = self.descriptor(level, tile.col * 2 + dx, tile.row * 2 + dy) {
                    out.push(child);
                }
            }
        }
        out
    }

    /// Tiles around `tiles` that are not themselves in `tiles`.
    ///
    /// Covers the same-level ring of `radius` cells and, with
    /// `include_cross_level`, the parents and children of every input tile.
    pub fn adjacent_tiles(
        &self,
        tiles: &[TileDescriptor],
        radius: u32,
        include_cross_level: bool,
    ) -> Vec<TileDescriptor> {
        let mut seen: fxhash::FxHashSet<(u32, u32, u32)> =
            tiles.iter().map(|t| (t.level, t.col, t.row)).collect();
        let mut out = Vec::new();
        let mut push = |tile: TileDescriptor, out: &mut Vec<TileDescriptor>| {
            if seen.insert((tile.level, tile.col, tile.row)) {
                out.push(tile);
            }
        };

        for tile in tiles {
            for n in self.neighbors(tile, radius) {
                push(n, &mut out);
            }
            if include_cross_level {
                if let Some(parent) = self.parent(tile) {
                    push(parent, &mut out);
                }
                for child in self.children(tile) {
                    push(child, &mut out);
                }
            }
        }
        out
    }
}

/// Input of a one-shot visibility query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileQuery {
    pub rect: Rect,
    pub tile_size: u32,
    pub image_width: f64,
    pub image_height: f64,
    pub scale: f64,
    pub forced_level: Option<u32>,
    pub max_level: Option<u32>,
}

/// Resolves the level for `query` and returns it with the covering tile set
pub fn visible_tiles(query: &TileQuery) -> (u32, Vec<TileDescriptor>) {
    let grid = TileGrid::new(query.image_width, query.image_height, query.tile_size)
        .with_max_level(query.max_level);
    let level = grid.resolve_level(query.scale, query.forced_level);
    (level, grid.tiles_in_rect(&query.rect, level))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> TileGrid {
        TileGrid::new(16384.0, 1024.0, 512)
    }

    #[test]
    fn test_max_level_for_wide_mosaic() {
        assert_eq!(compute_max_level(16384.0, 512), 5);
        assert_eq!(compute_max_level(300.0, 512), 0);
        assert_eq!(compute_max_level(0.0, 0), 0);
    }

    #[test]
    fn test_max_level_follows_long_side_of_stored_strip() {
        // A strip stored transposed gets the same pyramid as its display form
        assert_eq!(TileGrid::new(1024.0, 16384.0, 512).max_level, 5);
        assert_eq!(grid().max_level, 5);
    }

    #[test]
    fn test_preferred_level_examples() {
        assert_eq!(compute_preferred_level(1.0, 5), 0);
        assert_eq!(compute_preferred_level(2.0, 5), 0);
        assert_eq!(compute_preferred_level(0.5, 5), 1);
        assert_eq!(compute_preferred_level(0.03, 5), 5);
        assert_eq!(compute_preferred_level(0.0001, 5), 5);
        assert_eq!(compute_preferred_level(0.0, 5), 5);
    }

    #[test]
    fn test_preferred_level_is_monotone() {
        let mut previous = u32::MAX;
        let mut scale = 0.001;
        while scale < 16.0 {
            let level = compute_preferred_level(scale, 5);
            assert!(level <= 5);
            assert!(level <= previous, "level rose from {previous} to {level} at {scale}");
            previous = level;
            scale *= 1.07;
        }
    }

    #[test]
    fn test_example_visible_rect_yields_two_tiles() {
        let tiles = grid().tiles_in_rect(&Rect::new(0.0, 0.0, 1024.0, 512.0), 0);
        assert_eq!(tiles.len(), 2);
        assert_eq!((tiles[0].col, tiles[0].row), (0, 0));
        assert_eq!((tiles[1].col, tiles[1].row), (1, 0));
    }

    #[test]
    fn test_visible_tiles_query_resolves_level() {
        let (level, tiles) = visible_tiles(&TileQuery {
            rect: Rect::new(0.0, 0.0, 1024.0, 512.0),
            tile_size: 512,
            image_width: 16384.0,
            image_height: 1024.0,
            scale: 1.0,
            forced_level: None,
            max_level: None,
        });
        assert_eq!(level, 0);
        assert_eq!(tiles.len(), 2);
    }

    #[test]
    fn test_edge_tiles_are_clipped() {
        let grid = TileGrid::new(1000.0, 700.0, 512);
        let tiles = grid.tiles_in_rect(&Rect::new(-50.0, -50.0, 5000.0, 5000.0), 0);
        assert_eq!(tiles.len(), 4);
        let last = tiles.last().unwrap();
        assert_eq!(last.width, 1000.0 - 512.0);
        assert_eq!(last.height, 700.0 - 512.0);
        for tile in &tiles {
            assert!(grid.image_bounds().contains_rect(&tile.rect()));
        }
    }

    #[test]
    fn test_coverage_has_no_gaps() {
        let grid = TileGrid::new(5000.0, 3000.0, 256);
        let rects = [
            Rect::new(123.4, 77.7, 901.0, 455.5),
            Rect::new(4000.0, 2900.0, 2000.0, 2000.0),
            Rect::new(-10.0, -10.0, 20.0, 20.0),
        ];
        for rect in rects {
            let target = rect.intersection(&grid.image_bounds()).unwrap();
            for level in 0..=grid.max_level {
                let tiles = grid.tiles_in_rect(&rect, level);
                let covered: f64 = tiles
                    .iter()
                    .filter_map(|t| t.rect().intersection(&target))
                    .map(|r| r.area())
                    .sum();
                assert!(
                    (covered - target.area()).abs() < 1e-6,
                    "level {level}: covered {covered} of {}",
                    target.area()
                );
            }
        }
    }

    #[test]
    fn test_rect_outside_image_is_empty() {
        assert!(grid()
            .tiles_in_rect(&Rect::new(20000.0, 0.0, 100.0, 100.0), 0)
            .is_empty());
    }

    #[test]
    fn test_neighbors_parent_children() {
        let grid = grid();
        let tile = grid.descriptor(0, 0, 0).unwrap();
        let neighbors = grid.neighbors(&tile, 1);
        // (1,0), (0,1), (1,1) exist; negative cells are skipped
        assert_eq!(neighbors.len(), 3);

        let parent = grid.parent(&tile).unwrap();
        assert_eq!((parent.level, parent.col, parent.row), (1, 0, 0));
        let children = grid.children(&parent);
        assert_eq!(children.len(), 4);
        assert!(children.iter().any(|c| c.col == 1 && c.row == 1));
    }

    #[test]
    fn test_adjacent_tiles_skip_inputs_and_duplicates() {
        let grid = grid();
        let visible = grid.tiles_in_rect(&Rect::new(0.0, 0.0, 1024.0, 512.0), 0);
        let adjacent = grid.adjacent_tiles(&visible, 1, false);
        // Row 0 neighbours (2,0) plus row 1 cells (0..=2, 1)
        assert_eq!(adjacent.len(), 4);
        assert!(adjacent.iter().all(|t| t.level == 0 && !(t.row == 0 && t.col < 2)));

        let with_levels = grid.adjacent_tiles(&visible, 1, true);
        assert!(with_levels.iter().any(|t| t.level == 1));
        let mut keys: Vec<_> = with_levels.iter().map(|t| (t.level, t.col, t.row)).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), with_levels.len());
    }
}
