use anyhow::Context;
use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use mosaic_viewer::{
    annotation::{DefectClass, DrawMode, InMemoryAnnotationStore, StaticClassTable},
    core::config::{Orientation, ViewerOptions},
    core::geometry::Point,
    input::events::{InputEvent, KeyModifiers, MouseButton},
    rendering::surface::RasterSurface,
    runtime::TokioSpawner,
    tiles::key::{Surface, TileRequest},
    tiles::source::{PreheatBatch, PreheatReport, TileSupplier},
    viewer::{ImageInfo, MosaicViewer},
    ViewerEvent,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const CONTAINER_WIDTH: u32 = 1024;
const CONTAINER_HEIGHT: u32 = 768;
const FRAME: Duration = Duration::from_millis(16);

const CLASSES: &str = r##"{ "classes": [
    { "id": 1, "name": "scratch", "color": "#ff4040" },
    { "id": 2, "name": "inclusion", "color": "#40a0ff" },
    { "id": 3, "name": "roll mark" }
] }"##;

/// Headless walk through the viewer: load a synthetic mosaic, zoom in, mark a
/// defect and write the final frame to a PNG
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let output = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "mosaic-frame.png".to_string());

    let supplier = Arc::new(SyntheticSupplier::default());
    let store = Arc::new(InMemoryAnnotationStore::new());
    let classes = Arc::new(StaticClassTable::from_json_str(CLASSES)?);

    let mut viewer = MosaicViewer::new(
        ViewerOptions::default(),
        supplier.clone(),
        store.clone(),
        classes,
        Arc::new(TokioSpawner::current()?),
    )?;
    viewer.set_container_size(f64::from(CONTAINER_WIDTH), f64::from(CONTAINER_HEIGHT));
    viewer.set_image(
        ImageInfo {
            line_key: "hot-strip-1".to_string(),
            surface: Surface::Top,
            sequence_id: 20240611,
            width: 4096.0,
            height: 65536.0,
            orientation: Orientation::Vertical,
            view: None,
        },
        Instant::now(),
    );

    let mut surface = RasterSurface::new(CONTAINER_WIDTH, CONTAINER_HEIGHT);
    run_until_settled(&mut viewer, &mut surface).await;

    // Zoom towards the upper part of the strip
    let focus = Point::new(f64::from(CONTAINER_WIDTH) / 2.0, 120.0);
    for _ in 0..6 {
        viewer.handle_input(
            InputEvent::Wheel {
                delta: Point::new(0.0, -120.0),
                position: focus,
                modifiers: KeyModifiers::default(),
            },
            Instant::now(),
        );
    }
    run_until_settled(&mut viewer, &mut surface).await;

    // Mark a defect with a preselected class and submit it
    viewer.set_draw_mode(DrawMode::Mark);
    viewer
        .annotations_mut()
        .set_default_class(Some(DefectClass::new(1, "scratch")));
    drag(&mut viewer, Point::new(300.0, 200.0), Point::new(520.0, 330.0));
    let submitted = viewer.annotations_mut().submit_all_drafts(Instant::now());
    log::info!("submitted {submitted} draft(s)");
    run_until_settled(&mut viewer, &mut surface).await;

    let stats = viewer.last_frame_stats();
    log::info!(
        "level {}: {} exact, {} fallback, {} placeholder; {} tiles fetched, {} annotations stored",
        stats.level,
        stats.exact,
        stats.fallback,
        stats.placeholder,
        supplier.fetched.load(Ordering::Relaxed),
        store.len()
    );
    log::info!("preheat: {:?}", viewer.scheduler().stats());

    surface
        .into_image()
        .save(&output)
        .with_context(|| format!("writing {output}"))?;
    log::info!("frame written to {output}");
    Ok(())
}

/// Render frames until every visible tile is exact and annotations are synced
async fn run_until_settled(viewer: &mut MosaicViewer, surface: &mut RasterSurface) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let stats = viewer.frame(Instant::now(), surface);
        for event in viewer.drain_events() {
            log_event(&event);
        }
        let tiles_done = stats.visible > 0 && stats.exact == stats.visible;
        let annotations_done = viewer.annotations().sync_queue().is_idle();
        if tiles_done && annotations_done && !viewer.viewport().is_animating() {
            return;
        }
        if Instant::now() >= deadline {
            log::warn!("gave up waiting: {stats:?}");
            return;
        }
        tokio::time::sleep(FRAME).await;
    }
}

fn drag(viewer: &mut MosaicViewer, from: Point, to: Point) {
    let now = Instant::now();
    viewer.handle_input(
        InputEvent::PointerDown {
            position: from,
            button: MouseButton::Left,
            modifiers: KeyModifiers::default(),
        },
        now,
    );
    viewer.handle_input(InputEvent::PointerMove { position: to }, now);
    viewer.handle_input(
        InputEvent::PointerUp {
            position: to,
            button: MouseButton::Left,
        },
        now,
    );
}

fn log_event(event: &ViewerEvent) {
    match event {
        ViewerEvent::PointerMove { .. } => {}
        ViewerEvent::PreferredLevelChanged(level) => log::info!("preferred level {level}"),
        other => log::debug!("{other:?}"),
    }
}

/// Generates PNG tiles on the fly: a steel-grey gradient with a grid so the
/// level of detail is visible
#[derive(Default)]
struct SyntheticSupplier {
    fetched: AtomicUsize,
}

impl SyntheticSupplier {
    fn render_tile(request: &TileRequest) -> RgbaImage {
        let key = request.key;
        let size = key.tile_size;
        let shade = 90 + (key.level * 25).min(120) as u8;
        RgbaImage::from_fn(size, size, |x, y| {
            let border = x == 0 || y == 0;
            let stripe = ((key.tile_y * size + y) / 64) % 2 == 0;
            if border {
                Rgba([30, 30, 30, 255])
            } else if stripe {
                Rgba([shade, shade, shade.saturating_add(10), 255])
            } else {
                Rgba([shade.saturating_sub(15), shade.saturating_sub(15), shade, 255])
            }
        })
    }
}

#[async_trait]
impl TileSupplier for SyntheticSupplier {
    fn tile_url(&self, request: &TileRequest) -> String {
        format!("synthetic://{}", request.key)
    }

    async fn fetch_tile(&self, request: &TileRequest) -> mosaic_viewer::Result<Vec<u8>> {
        self.fetched.fetch_add(1, Ordering::Relaxed);
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(Self::render_tile(request))
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)?;
        Ok(bytes)
    }

    async fn preheat_tiles(&self, batch: PreheatBatch) -> mosaic_viewer::Result<PreheatReport> {
        log::debug!(
            "preheat {} tiles of {}/{} ({:?})",
            batch.tiles.len(),
            batch.surface,
            batch.sequence_id,
            batch.priority
        );
        Ok(PreheatReport {
            preheated: batch.tiles.len(),
        })
    }
}
