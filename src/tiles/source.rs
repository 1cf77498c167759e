use crate::tiles::key::{MosaicView, Surface, TileRequest};
use crate::tiles::tiling::TileGrid;
use crate::{Error, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shared async HTTP client for tile and preheat requests. Building it once
/// avoids TLS and connection pool setup for every tile.
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent("mosaic-viewer/0.1.0")
        .timeout(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(16)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Relative urgency of a preheat batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreheatPriority {
    /// Speculative, from movement prediction
    Low,
    #[default]
    Normal,
    /// Tiles around what is on screen right now
    High,
}

/// One tile address inside a preheat call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PreheatTile {
    pub level: u32,
    pub tile_x: u32,
    pub tile_y: u32,
}

/// Batched server-side cache warm-up request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreheatBatch {
    pub surface: Surface,
    pub sequence_id: u64,
    pub tile_size: u32,
    pub tiles: Vec<PreheatTile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<MosaicView>,
    pub priority: PreheatPriority,
}

/// Request to warm the ring of tiles around `current_tiles`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjacentPreheat {
    pub surface: Surface,
    pub sequence_id: u64,
    pub tile_size: u32,
    pub current_tiles: Vec<PreheatTile>,
    pub radius: u32,
    pub include_cross_level: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<MosaicView>,
    /// Pyramid used for local neighbour expansion
    #[serde(skip)]
    pub grid: Option<TileGrid>,
}

/// Server answer to a preheat call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PreheatReport {
    pub preheated: usize,
}

/// Trait representing anything that can produce tiles for the viewer
#[async_trait]
pub trait TileSupplier: Send + Sync {
    /// Build a URL for the requested tile
    fn tile_url(&self, request: &TileRequest) -> String;

    /// Fetch the encoded tile bytes
    async fn fetch_tile(&self, request: &TileRequest) -> Result<Vec<u8>>;

    /// Ask the server to warm its cache for a batch of tiles
    async fn preheat_tiles(&self, batch: PreheatBatch) -> Result<PreheatReport>;

    /// Warm the tiles adjacent to `current_tiles`.
    ///
    /// The default expands neighbours locally with the tiling module and
    /// forwards them as a normal batch.
    async fn preheat_adjacent(&self, request: AdjacentPreheat) -> Result<PreheatReport> {
        let Some(grid) = request.grid else {
            return Err(Error::Supplier(
                "adjacent preheat needs a tile grid for local expansion".to_string(),
            ));
        };
        let current: Vec<_> = request
            .current_tiles
            .iter()
            .filter_map(|t| grid.descriptor(t.level, t.tile_x, t.tile_y))
            .collect();
        let tiles: Vec<PreheatTile> = grid
            .adjacent_tiles(&current, request.radius, request.include_cross_level)
            .into_iter()
            .map(|t| PreheatTile {
                level: t.level,
                tile_x: t.col,
                tile_y: t.row,
            })
            .collect();
        if tiles.is_empty() {
            return Ok(PreheatReport::default());
        }
        self.preheat_tiles(PreheatBatch {
            surface: request.surface,
            sequence_id: request.sequence_id,
            tile_size: request.tile_size,
            tiles,
            view: request.view,
            priority: PreheatPriority::Normal,
        })
        .await
    }
}

/// Tile supplier backed by an HTTP tile server.
///
/// The URL template understands `{surface}`, `{seq}`, `{level}`, `{x}`, `{y}`,
/// `{size}`, `{format}` and `{view}`.
#[derive(Debug, Clone)]
pub struct HttpTileSupplier {
    url_template: String,
    preheat_url: Option<String>,
}

impl HttpTileSupplier {
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            preheat_url: None,
        }
    }

    /// Enable server-side preheating through a JSON POST endpoint
    pub fn with_preheat_url(mut self, url: impl Into<String>) -> Self {
        self.preheat_url = Some(url.into());
        self
    }
}

#[async_trait]
impl TileSupplier for HttpTileSupplier {
    fn tile_url(&self, request: &TileRequest) -> String {
        let key = &request.key;
        self.url_template
            .replace("{surface}", key.surface.as_str())
            .replace("{seq}", &key.sequence_id.to_string())
            .replace("{level}", &key.level.to_string())
            .replace("{x}", &key.tile_x.to_string())
            .replace("{y}", &key.tile_y.to_string())
            .replace("{size}", &key.tile_size.to_string())
            .replace("{format}", request.format.extension())
            .replace("{view}", request.view.as_ref().map_or("", |v| v.as_str()))
    }

    async fn fetch_tile(&self, request: &TileRequest) -> Result<Vec<u8>> {
        let url = self.tile_url(request);
        let resp = HTTP_CLIENT.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Supplier(format!("HTTP {} for {}", resp.status(), url)));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn preheat_tiles(&self, batch: PreheatBatch) -> Result<PreheatReport> {
        let Some(url) = &self.preheat_url else {
            return Ok(PreheatReport::default());
        };
        let resp = HTTP_CLIENT.post(url).json(&batch).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Supplier(format!("preheat HTTP {}", resp.status())));
        }
        Ok(resp.json::<PreheatReport>().await?)
    }
}
