use crate::core::camera::Camera;
use crate::core::config::{Orientation, ViewerOptions};
use crate::core::geometry::Rect;
use crate::prelude::{Arc, Instant};
use crate::rendering::orientation::OrientationAdapter;
use crate::rendering::surface::{DrawSurface, StrokeStyle, BORDER_COLOR, PLACEHOLDER_COLOR};
use crate::runtime::SharedSpawner;
use crate::tiles::bitmap::TileBitmap;
use crate::tiles::cache::BitmapCache;
use crate::tiles::key::{MosaicView, Surface, TileKey};
use crate::tiles::loader::{RequestOutcome, TileLoader, TileLoaderConfig};
use crate::tiles::source::TileSupplier;
use crate::tiles::tiling::{TileDescriptor, TileGrid};

/// Mosaic currently shown by a renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTarget {
    pub surface: Surface,
    pub sequence_id: u64,
    pub grid: TileGrid,
}

impl RenderTarget {
    pub fn key_for(&self, tile: &TileDescriptor) -> TileKey {
        tile.key(self.surface, self.sequence_id, self.grid.tile_size)
    }
}

/// What the overlay callback gets to draw with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayContext {
    pub camera: Camera,
    /// Whole mosaic in display world coordinates
    pub image_rect: Rect,
    pub surface: Surface,
    pub orientation: Orientation,
    pub level: u32,
}

/// Mosaic-level decoration drawn after tiles and before annotations
pub type OverlayFn = Box<dyn FnMut(&mut dyn DrawSurface, &OverlayContext) + Send>;

/// Per-frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub level: u32,
    pub level_changed: bool,
    /// On-screen tiles
    pub visible: usize,
    pub exact: usize,
    pub fallback: usize,
    pub placeholder: usize,
    /// Loads started this frame, including margin tiles
    pub requested: usize,
}

/// Source sub-rectangle (in ancestor bitmap pixels) covering `tile`.
///
/// Both rectangles are world coordinates; the ancestor bitmap spans
/// `ancestor` exactly, whatever its pixel size.
pub fn fallback_source_rect(tile: &Rect, ancestor: &Rect, bitmap_width: u32, bitmap_height: u32) -> Rect {
    let sx = f64::from(bitmap_width) / ancestor.width.max(1.0);
    let sy = f64::from(bitmap_height) / ancestor.height.max(1.0);
    Rect::new(
        (tile.x - ancestor.x) * sx,
        (tile.y - ancestor.y) * sy,
        tile.width * sx,
        tile.height * sy,
    )
}

/// Dashed outline around the mosaic, the default overlay
pub fn draw_surface_border(surface: &mut dyn DrawSurface, ctx: &OverlayContext) {
    let rect = ctx.camera.world_rect_to_screen(&ctx.image_rect);
    surface.stroke_rect(rect, &StrokeStyle::dashed(BORDER_COLOR, 1.0, 6.0, 4.0));
}

/// Per-frame tile draw loop.
///
/// Each frame works against one camera snapshot: visible tiles are drawn
/// from the cache, from a cached coarser ancestor, or as a placeholder, and
/// every miss schedules a single async load. The frame never waits on I/O.
pub struct TileRenderer {
    cache: BitmapCache,
    loader: TileLoader,
    adapter: OrientationAdapter,
    tile_size: u32,
    max_level: Option<u32>,
    fixed_level: Option<u32>,
    prefetch_margin_px: f64,
    draw_borders: bool,
    overlay: Option<OverlayFn>,
    target: Option<RenderTarget>,
    last_level: Option<u32>,
}

impl TileRenderer {
    pub fn new(
        options: &ViewerOptions,
        supplier: Arc<dyn TileSupplier>,
        spawner: SharedSpawner,
    ) -> Self {
        let mut loader = TileLoader::new(
            supplier,
            spawner,
            TileLoaderConfig {
                max_attempts: options.tile_max_attempts.max(1),
                ..TileLoaderConfig::default()
            },
        );
        loader.set_format(options.tile_format);
        loader.set_view(options.view.clone());

        Self {
            cache: BitmapCache::new(options.cache_max_tiles, options.cache_max_bytes),
            loader,
            adapter: OrientationAdapter::new(options.orientation),
            tile_size: options.tile_size.max(1),
            max_level: options.max_level,
            fixed_level: options.fixed_level,
            prefetch_margin_px: options.prefetch_margin_px.max(0.0),
            draw_borders: options.draw_surface_borders,
            overlay: None,
            target: None,
            last_level: None,
        }
    }

    /// Show a new mosaic; `width`/`height` are storage dimensions
    pub fn set_image(&mut self, surface: Surface, sequence_id: u64, width: f64, height: f64) {
        let grid = TileGrid::new(width, height, self.tile_size).with_max_level(self.max_level);
        log::info!(
            "showing {surface} mosaic {sequence_id}: {width}x{height}, {} levels",
            grid.max_level + 1
        );
        self.target = Some(RenderTarget {
            surface,
            sequence_id,
            grid,
        });
        self.last_level = None;
    }

    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.adapter = OrientationAdapter::new(orientation);
    }

    pub fn set_view(&mut self, view: Option<MosaicView>) {
        self.loader.set_view(view);
    }

    pub fn set_fixed_level(&mut self, level: Option<u32>) {
        self.fixed_level = level;
    }

    pub fn set_overlay(&mut self, overlay: Option<OverlayFn>) {
        self.overlay = overlay;
    }

    pub fn target(&self) -> Option<&RenderTarget> {
        self.target.as_ref()
    }

    pub fn adapter(&self) -> OrientationAdapter {
        self.adapter
    }

    pub fn cache(&self) -> &BitmapCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut BitmapCache {
        &mut self.cache
    }

    pub fn loader(&self) -> &TileLoader {
        &self.loader
    }

    /// Level tiles are drawn at for `scale`
    pub fn preferred_level(&self, scale: f64) -> Option<u32> {
        self.target
            .map(|t| t.grid.resolve_level(scale, self.fixed_level))
    }

    /// Level and tiles covering the view without the prefetch margin
    pub fn visible_tiles(&self, camera: &Camera, width: f64, height: f64) -> (u32, Vec<TileDescriptor>) {
        let Some(target) = self.target else {
            return (0, Vec::new());
        };
        let visible = self
            .adapter
            .to_storage_rect(&camera.visible_rect(width, height));
        let level = target.grid.resolve_level(camera.scale, self.fixed_level);
        (level, target.grid.tiles_in_rect(&visible, level))
    }

    /// Move finished downloads into the cache; returns how many arrived
    pub fn pump(&mut self, now: Instant) -> usize {
        let ready = self.loader.drain(now);
        let count = ready.len();
        for (key, bitmap) in ready {
            self.cache.insert(key, bitmap);
        }
        count
    }

    pub fn render(&mut self, camera: &Camera, surface: &mut dyn DrawSurface, now: Instant) -> FrameStats {
        self.pump(now);
        surface.clear();

        let Some(target) = self.target else {
            return FrameStats::default();
        };
        let (width, height) = surface.size();
        let scale = camera.scale;
        let visible = self
            .adapter
            .to_storage_rect(&camera.visible_rect(width, height));
        let margin = if scale > 0.0 && scale.is_finite() {
            self.prefetch_margin_px / scale
        } else {
            0.0
        };
        let level = target.grid.resolve_level(scale, self.fixed_level);
        let tiles = target.grid.tiles_in_rect(&visible.expanded(margin), level);

        let mut stats = FrameStats {
            level,
            level_changed: self.last_level != Some(level),
            ..FrameStats::default()
        };
        self.last_level = Some(level);
        let transpose = self.adapter.transposes();

        for tile in &tiles {
            let key = target.key_for(tile);
            if !tile.rect().intersects(&visible) {
                // Margin tile: warm the cache only
                if !self.cache.contains(&key) && self.loader.request(key, now) == RequestOutcome::Started {
                    stats.requested += 1;
                }
                continue;
            }

            stats.visible += 1;
            let dst = camera.world_rect_to_screen(&self.adapter.to_display_rect(&tile.rect()));
            if let Some(bitmap) = self.cache.get(&key).cloned() {
                let src = Rect::new(0.0, 0.0, f64::from(bitmap.width()), f64::from(bitmap.height()));
                surface.draw_bitmap(&bitmap, src, dst, transpose);
                stats.exact += 1;
                continue;
            }

            if self.loader.request(key, now) == RequestOutcome::Started {
                stats.requested += 1;
            }
            match self.find_fallback(&target, tile, &key) {
                Some((bitmap, src)) => {
                    surface.draw_bitmap(&bitmap, src, dst, transpose);
                    stats.fallback += 1;
                }
                None => {
                    surface.fill_rect(dst, PLACEHOLDER_COLOR);
                    stats.placeholder += 1;
                }
            }
        }

        let ctx = OverlayContext {
            camera: *camera,
            image_rect: self.adapter.to_display_rect(&target.grid.image_bounds()),
            surface: target.surface,
            orientation: self.adapter.orientation(),
            level,
        };
        match self.overlay.as_mut() {
            Some(overlay) => overlay(surface, &ctx),
            None if self.draw_borders => draw_surface_border(surface, &ctx),
            None => {}
        }

        if stats.placeholder > 0 || stats.fallback > 0 {
            log::debug!(
                "frame at level {level}: {} exact, {} fallback, {} placeholder",
                stats.exact,
                stats.fallback,
                stats.placeholder
            );
        }
        stats
    }

    /// Nearest cached coarser tile covering `tile`, with the source rect to sample
    fn find_fallback(
        &mut self,
        target: &RenderTarget,
        tile: &TileDescriptor,
        key: &TileKey,
    ) -> Option<(TileBitmap, Rect)> {
        for level in tile.level + 1..=target.grid.max_level {
            let Some(ancestor_key) = key.ancestor(level) else {
                continue;
            };
            if !self.cache.contains(&ancestor_key) {
                continue;
            }
            let Some(ancestor) = target
                .grid
                .descriptor(level, ancestor_key.tile_x, ancestor_key.tile_y)
            else {
                continue;
            };
            let bitmap = self.cache.get(&ancestor_key)?.clone();
            let src = fallback_source_rect(&tile.rect(), &ancestor.rect(), bitmap.width(), bitmap.height());
            return Some((bitmap, src));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::surface::{DrawCommand, RecordingSurface};
    use crate::runtime::InlineSpawner;
    use crate::tiles::key::TileRequest;
    use crate::tiles::source::{PreheatBatch, PreheatReport};
    use crate::{Error, Result};
    use async_trait::async_trait;
    use image::Rgba;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Supplier that never answers successfully
    #[derive(Default)]
    struct OfflineSupplier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TileSupplier for OfflineSupplier {
        fn tile_url(&self, request: &TileRequest) -> String {
            request.key.to_string()
        }

        async fn fetch_tile(&self, _request: &TileRequest) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Supplier("offline".into()))
        }

        async fn preheat_tiles(&self, _batch: PreheatBatch) -> Result<PreheatReport> {
            Ok(PreheatReport::default())
        }
    }

    fn renderer(options: &ViewerOptions) -> (TileRenderer, Arc<OfflineSupplier>) {
        let supplier = Arc::new(OfflineSupplier::default());
        let mut renderer = TileRenderer::new(options, supplier.clone(), Arc::new(InlineSpawner));
        renderer.set_image(Surface::Top, 1, 16384.0, 1024.0);
        (renderer, supplier)
    }

    fn no_margin() -> ViewerOptions {
        ViewerOptions {
            prefetch_margin_px: 0.0,
            draw_surface_borders: false,
            ..ViewerOptions::default()
        }
    }

    #[test]
    fn test_fallback_source_rect_for_child_tile() {
        // Level-1 ancestor covers 1024x1024 world units in a 512px bitmap
        let ancestor = Rect::new(0.0, 0.0, 1024.0, 1024.0);
        let tile = Rect::new(512.0, 0.0, 512.0, 512.0);
        assert_eq!(
            fallback_source_rect(&tile, &ancestor, 512, 512),
            Rect::new(256.0, 0.0, 256.0, 256.0)
        );
        // Clipped edge ancestor whose bitmap is smaller
        let edge = Rect::new(1024.0, 0.0, 600.0, 1024.0);
        let child = Rect::new(1536.0, 512.0, 88.0, 512.0);
        assert_eq!(
            fallback_source_rect(&child, &edge, 300, 512),
            Rect::new(256.0, 256.0, 44.0, 256.0)
        );
    }

    #[test]
    fn test_missing_tiles_draw_placeholders_and_request_once() {
        let (mut renderer, supplier) = renderer(&no_margin());
        let camera = Camera::new(0.0, 0.0, 1.0);
        let mut surface = RecordingSurface::new(1024.0, 512.0);
        let t0 = Instant::now();

        let stats = renderer.render(&camera, &mut surface, t0);
        assert_eq!(stats.level, 0);
        assert!(stats.level_changed);
        assert_eq!(stats.visible, 2);
        assert_eq!(stats.placeholder, 2);
        assert_eq!(stats.requested, 2);
        assert_eq!(surface.fills_of(PLACEHOLDER_COLOR), 2);
        assert_eq!(supplier.calls.load(Ordering::SeqCst), 2);

        // Failures are backing off, so the next frame does not re-request
        let stats = renderer.render(&camera, &mut surface, t0);
        assert_eq!(stats.requested, 0);
        assert!(!stats.level_changed);
        assert_eq!(supplier.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cached_ancestor_is_used_as_fallback() {
        let (mut renderer, _) = renderer(&no_margin());
        let ancestor = TileKey::new(Surface::Top, 1, 1, 0, 0, 512);
        renderer
            .cache_mut()
            .insert(ancestor, TileBitmap::solid(512, 512, Rgba([9, 9, 9, 255])));

        let camera = Camera::new(-512.0, 0.0, 1.0);
        let mut surface = RecordingSurface::new(512.0, 512.0);
        let stats = renderer.render(&camera, &mut surface, Instant::now());
        assert_eq!((stats.visible, stats.fallback, stats.placeholder), (1, 1, 0));

        let draw = surface.bitmap_draws().next().cloned();
        match draw {
            Some(DrawCommand::Bitmap { src, dst, transpose, .. }) => {
                assert_eq!(src, Rect::new(256.0, 0.0, 256.0, 256.0));
                assert_eq!(dst, Rect::new(0.0, 0.0, 512.0, 512.0));
                assert!(!transpose);
            }
            other => panic!("expected a bitmap draw, got {other:?}"),
        }
    }

    #[test]
    fn test_exact_tile_wins_over_ancestor() {
        let (mut renderer, _) = renderer(&no_margin());
        let exact = TileKey::new(Surface::Top, 1, 0, 0, 0, 512);
        renderer.cache_mut().insert(exact, TileBitmap::solid(512, 512, Rgba([1, 1, 1, 255])));
        renderer.cache_mut().insert(
            TileKey::new(Surface::Top, 1, 1, 0, 0, 512),
            TileBitmap::solid(512, 512, Rgba([2, 2, 2, 255])),
        );

        let mut surface = RecordingSurface::new(512.0, 512.0);
        let stats = renderer.render(&Camera::new(0.0, 0.0, 1.0), &mut surface, Instant::now());
        assert_eq!((stats.exact, stats.fallback), (1, 0));
    }

    #[test]
    fn test_prefetch_margin_requests_offscreen_tiles() {
        let options = ViewerOptions {
            prefetch_margin_px: 512.0,
            ..no_margin()
        };
        let (mut renderer, _) = renderer(&options);
        let mut surface = RecordingSurface::new(1024.0, 512.0);
        let stats = renderer.render(&Camera::new(0.0, 0.0, 1.0), &mut surface, Instant::now());
        assert_eq!(stats.visible, 2);
        // Column 2 and row 1 (columns 0..=2) join through the margin
        assert_eq!(stats.requested, 6);
    }

    #[test]
    fn test_horizontal_orientation_transposes_draws() {
        let options = ViewerOptions {
            orientation: Orientation::Horizontal,
            ..no_margin()
        };
        let supplier = Arc::new(OfflineSupplier::default());
        let mut renderer = TileRenderer::new(&options, supplier, Arc::new(InlineSpawner));
        // Stored tall: 1024 wide, 16384 high; shown wide
        renderer.set_image(Surface::Bottom, 3, 1024.0, 16384.0);
        let key = TileKey::new(Surface::Bottom, 3, 0, 0, 1, 512);
        renderer.cache_mut().insert(key, TileBitmap::solid(512, 512, Rgba([5, 5, 5, 255])));

        // Display x in [512, 1024) maps to storage row 1
        let camera = Camera::new(-512.0, 0.0, 1.0);
        let mut surface = RecordingSurface::new(512.0, 512.0);
        let stats = renderer.render(&camera, &mut surface, Instant::now());
        assert_eq!(stats.exact, 1);
        match surface.bitmap_draws().next() {
            Some(DrawCommand::Bitmap { dst, transpose, .. }) => {
                assert!(*transpose);
                assert_eq!(*dst, Rect::new(0.0, 0.0, 512.0, 512.0));
            }
            other => panic!("expected a bitmap draw, got {other:?}"),
        };
    }

    #[test]
    fn test_overlay_runs_after_tiles() {
        let (mut renderer, _) = renderer(&ViewerOptions {
            draw_surface_borders: true,
            ..no_margin()
        });
        let mut surface = RecordingSurface::new(512.0, 512.0);
        renderer.render(&Camera::new(0.0, 0.0, 1.0), &mut surface, Instant::now());
        assert!(matches!(
            surface.commands().last(),
            Some(DrawCommand::StrokeRect { style, .. }) if style.is_dashed()
        ));

        renderer.set_overlay(Some(Box::new(|surface: &mut dyn DrawSurface, ctx: &OverlayContext| {
            surface.draw_label(crate::core::geometry::Point::new(0.0, 0.0), ctx.surface.as_str(), BORDER_COLOR);
        })));
        renderer.render(&Camera::new(0.0, 0.0, 1.0), &mut surface, Instant::now());
        assert_eq!(surface.labels(), vec!["top"]);
    }
}
