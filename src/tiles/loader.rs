use crossbeam_channel::{unbounded, Receiver, Sender};

use super::bitmap::TileBitmap;
use super::key::{MosaicView, TileFormat, TileKey, TileRequest};
use super::source::TileSupplier;
use crate::prelude::{Arc, Duration, HashMap, HashSet, Instant};
use crate::runtime::{self, SharedSpawner};
use crate::Result;

/// Result of a tile loading operation
#[derive(Debug)]
pub struct TileResult {
    pub key: TileKey,
    pub bitmap: Result<TileBitmap>,
}

/// Configuration for the tile loader
#[derive(Debug, Clone)]
pub struct TileLoaderConfig {
    /// Maximum number of attempts per tile before giving up for the session
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per failure
    pub retry_base_delay: Duration,
    /// Upper bound on the retry delay
    pub retry_max_delay: Duration,
}

impl Default for TileLoaderConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            retry_base_delay: Duration::from_millis(250),
            retry_max_delay: Duration::from_secs(8),
        }
    }
}

impl TileLoaderConfig {
    pub fn for_testing() -> Self {
        Self {
            max_attempts: 2,
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_millis(400),
        }
    }

    /// Backoff after `failures` consecutive failures
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 2_u32.saturating_pow(failures.saturating_sub(1).min(16));
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }
}

#[derive(Debug, Clone, Copy)]
struct FailureState {
    failures: u32,
    retry_at: Instant,
}

/// Why a `request` call did not start a download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Started,
    AlreadyPending,
    BackingOff,
    GaveUp,
}

/// Async tile loader with one in-flight download per key.
///
/// Downloads run on the injected spawner and report back over a channel;
/// [`TileLoader::drain`] hands finished bitmaps to the render timeline.
/// A failed key is dropped from the pending set so that a later cache miss
/// can retry it once its backoff has elapsed.
pub struct TileLoader {
    supplier: Arc<dyn TileSupplier>,
    spawner: SharedSpawner,
    config: TileLoaderConfig,
    format: TileFormat,
    view: Option<MosaicView>,
    result_tx: Sender<TileResult>,
    result_rx: Receiver<TileResult>,
    /// Currently pending/downloading tiles to prevent duplicates
    pending: HashSet<TileKey>,
    failures: HashMap<TileKey, FailureState>,
}

impl TileLoader {
    pub fn new(
        supplier: Arc<dyn TileSupplier>,
        spawner: SharedSpawner,
        config: TileLoaderConfig,
    ) -> Self {
        let (result_tx, result_rx) = unbounded();
        Self {
            supplier,
            spawner,
            config,
            format: TileFormat::default(),
            view: None,
            result_tx,
            result_rx,
            pending: HashSet::default(),
            failures: HashMap::default(),
        }
    }

    pub fn set_format(&mut self, format: TileFormat) {
        self.format = format;
    }

    pub fn set_view(&mut self, view: Option<MosaicView>) {
        self.view = view;
    }

    pub fn supplier(&self) -> &Arc<dyn TileSupplier> {
        &self.supplier
    }

    pub fn config(&self) -> &TileLoaderConfig {
        &self.config
    }

    pub fn is_pending(&self, key: &TileKey) -> bool {
        self.pending.contains(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Start downloading `key` unless it is in flight or backing off
    pub fn request(&mut self, key: TileKey, now: Instant) -> RequestOutcome {
        if self.pending.contains(&key) {
            return RequestOutcome::AlreadyPending;
        }
        if let Some(state) = self.failures.get(&key) {
            if state.failures >= self.config.max_attempts {
                return RequestOutcome::GaveUp;
            }
            if now < state.retry_at {
                return RequestOutcome::BackingOff;
            }
        }

        self.pending.insert(key);
        let request = TileRequest {
            key,
            format: self.format,
            view: self.view.clone(),
        };
        let supplier = Arc::clone(&self.supplier);
        let tx = self.result_tx.clone();
        log::debug!("requesting tile {key}");

        runtime::spawn(self.spawner.as_ref(), async move {
            let bitmap = match supplier.fetch_tile(&request).await {
                Ok(bytes) => TileBitmap::decode(&bytes),
                Err(e) => Err(e),
            };
            // The receiver only disappears with the loader itself
            let _ = tx.send(TileResult {
                key: request.key,
                bitmap,
            });
        });
        RequestOutcome::Started
    }

    /// Collect finished downloads without blocking.
    ///
    /// Successful bitmaps are returned; failures are recorded for backoff
    /// and logged.
    pub fn drain(&mut self, now: Instant) -> Vec<(TileKey, TileBitmap)> {
        let mut ready = Vec::new();
        while let Ok(result) = self.result_rx.try_recv() {
            self.pending.remove(&result.key);
            match result.bitmap {
                Ok(bitmap) => {
                    self.failures.remove(&result.key);
                    ready.push((result.key, bitmap));
                }
                Err(e) => {
                    let failures = self
                        .failures
                        .get(&result.key)
                        .map_or(1, |state| state.failures + 1);
                    let retry_at = now + self.config.backoff(failures);
                    if failures >= self.config.max_attempts {
                        log::warn!("giving up on tile {} after {failures} attempts: {e}", result.key);
                    } else {
                        log::warn!("tile {} failed (attempt {failures}): {e}", result.key);
                    }
                    self.failures
                        .insert(result.key, FailureState { failures, retry_at });
                }
            }
        }
        ready
    }

    /// Forget all failure history, e.g. after the supplier reconnects
    pub fn reset_failures(&mut self) {
        self.failures.clear();
    }
}
