//! Batched, throttled server-side tile preheating.
//!
//! Requests are queued, grouped by mosaic, de-duplicated against tiles that
//! were preheated recently, capped and flushed after a short debounce. The
//! scheduler is owned by one viewer; nothing here is process-wide.

use std::num::NonZeroUsize;

use crossbeam_channel::{unbounded, Receiver, Sender};
use lru::LruCache;

use super::history::{ActionHistory, UserActionKind, ViewportPrediction};
use crate::core::config::PreheatOptions;
use crate::core::geometry::Rect;
use crate::prelude::{Arc, HashSet, Instant, VecDeque};
use crate::rendering::renderer::RenderTarget;
use crate::runtime::{self, SharedSpawner};
use crate::tiles::key::{MosaicView, Surface, TileKey};
use crate::tiles::source::{
    AdjacentPreheat, PreheatBatch, PreheatPriority, PreheatReport, PreheatTile, TileSupplier,
};
use crate::tiles::tiling::{compute_preferred_level, TileDescriptor};
use crate::Result;

/// One queued preheat request
#[derive(Debug, Clone, PartialEq)]
pub struct PreheatRequest {
    pub surface: Surface,
    pub sequence_id: u64,
    pub tile_size: u32,
    pub view: Option<MosaicView>,
    pub tiles: Vec<PreheatTile>,
    pub priority: PreheatPriority,
    /// Bypass the burst throttle and flush without debounce
    pub immediate: bool,
}

impl PreheatRequest {
    pub fn from_descriptors(
        target: &RenderTarget,
        view: Option<MosaicView>,
        tiles: &[TileDescriptor],
        priority: PreheatPriority,
    ) -> Self {
        Self {
            surface: target.surface,
            sequence_id: target.sequence_id,
            tile_size: target.grid.tile_size,
            view,
            tiles: tiles
                .iter()
                .map(|t| PreheatTile {
                    level: t.level,
                    tile_x: t.col,
                    tile_y: t.row,
                })
                .collect(),
            priority,
            immediate: false,
        }
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    fn group(&self) -> (Surface, u64, u32, Option<MosaicView>) {
        (self.surface, self.sequence_id, self.tile_size, self.view.clone())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreheatStats {
    pub batches_sent: u64,
    pub tiles_sent: u64,
    /// Tiles the server reported as warmed
    pub tiles_preheated: u64,
    pub failures: u64,
    /// Requests refused by the throttle
    pub throttled: u64,
    /// Requests or tiles dropped by the queue or batch caps
    pub dropped: u64,
    /// Predictive requests accepted into the queue
    pub predictions: u64,
}

struct Outcome {
    keys: Vec<TileKey>,
    result: Result<PreheatReport>,
}

pub struct PreheatScheduler {
    supplier: Arc<dyn TileSupplier>,
    spawner: SharedSpawner,
    options: PreheatOptions,
    queue: VecDeque<PreheatRequest>,
    history: ActionHistory,
    /// Tiles preheated or in flight, with the time they were sent
    recent: LruCache<TileKey, Instant>,
    last_accepted: Option<Instant>,
    /// Predictions are throttled on their own so they never compete with
    /// the visible-tile request issued in the same frame
    last_predicted: Option<Instant>,
    /// Visible set the ring was last requested for
    adjacent_for: Vec<TileKey>,
    flush_at: Option<Instant>,
    tx: Sender<Outcome>,
    rx: Receiver<Outcome>,
    in_flight: usize,
    stats: PreheatStats,
}

impl PreheatScheduler {
    pub fn new(supplier: Arc<dyn TileSupplier>, spawner: SharedSpawner, options: PreheatOptions) -> Self {
        let (tx, rx) = unbounded();
        let capacity = NonZeroUsize::new(options.recent_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            supplier,
            spawner,
            history: ActionHistory::new(options.history_len),
            options,
            queue: VecDeque::new(),
            recent: LruCache::new(capacity),
            last_accepted: None,
            last_predicted: None,
            adjacent_for: Vec::new(),
            flush_at: None,
            tx,
            rx,
            in_flight: 0,
            stats: PreheatStats::default(),
        }
    }

    pub fn options(&self) -> &PreheatOptions {
        &self.options
    }

    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    pub fn stats(&self) -> PreheatStats {
        self.stats
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// When the queued requests will be flushed, if any are queued
    pub fn next_flush(&self) -> Option<Instant> {
        self.flush_at
    }

    pub fn is_recent(&self, key: &TileKey, now: Instant) -> bool {
        self.recent
            .peek(key)
            .map_or(false, |sent| now.saturating_duration_since(*sent) < self.options.recent_ttl())
    }

    /// Forget history and recently-preheated tiles, e.g. when the mosaic changes
    pub fn reset(&mut self) {
        self.queue.clear();
        self.history.clear();
        self.recent.clear();
        self.flush_at = None;
        self.last_accepted = None;
        self.last_predicted = None;
        self.adjacent_for.clear();
    }

    /// Queue a request. Returns `false` when it was refused by the burst
    /// throttle or preheating is disabled.
    pub fn request(&mut self, request: PreheatRequest, now: Instant) -> bool {
        if !self.admit(&request, self.last_accepted, now) {
            return false;
        }
        self.last_accepted = Some(now);
        self.enqueue(request, now);
        true
    }

    fn admit(&mut self, request: &PreheatRequest, last: Option<Instant>, now: Instant) -> bool {
        if !self.options.enabled || request.tiles.is_empty() {
            return false;
        }
        if !request.immediate {
            if let Some(last) = last {
                if now.saturating_duration_since(last) < self.options.min_interval() {
                    self.stats.throttled += 1;
                    return false;
                }
            }
        }
        true
    }

    fn enqueue(&mut self, request: PreheatRequest, now: Instant) {
        let immediate = request.immediate;
        self.queue.push_back(request);
        while self.queue.len() > self.options.max_queue_len.max(1) {
            self.queue.pop_front();
            self.stats.dropped += 1;
        }

        if immediate {
            self.flush(now);
        } else {
            self.flush_at = Some(now + self.options.debounce());
        }
    }

    /// Preheat the on-screen tiles and their neighbourhood
    pub fn preheat_visible(
        &mut self,
        target: &RenderTarget,
        view: Option<MosaicView>,
        tiles: &[TileDescriptor],
        immediate: bool,
        now: Instant,
    ) -> bool {
        let mut all = tiles.to_vec();
        if self.options.adjacent_on_server {
            self.preheat_adjacent(target, view.clone(), tiles);
        } else {
            all.extend(target.grid.adjacent_tiles(
                tiles,
                self.options.neighbor_radius,
                self.options.include_cross_level,
            ));
        }
        let mut request = PreheatRequest::from_descriptors(target, view, &all, PreheatPriority::High);
        request.immediate = immediate;
        self.request(request, now)
    }

    /// Record a viewport sample and, when the movement is predictable
    /// enough, preheat where the view is heading
    pub fn observe_viewport(
        &mut self,
        target: &RenderTarget,
        view: Option<MosaicView>,
        kind: UserActionKind,
        viewport: Rect,
        scale: f64,
        now: Instant,
    ) -> Option<ViewportPrediction> {
        self.history.record(kind, viewport, scale, now);
        let prediction = self.history.predict()?;
        if prediction.confidence < self.options.confidence_threshold {
            return None;
        }
        let level = compute_preferred_level(prediction.scale, target.grid.max_level);
        let tiles = target.grid.tiles_in_rect(&prediction.viewport, level);
        log::debug!(
            "predictive preheat of {} tiles at level {level} (confidence {:.2})",
            tiles.len(),
            prediction.confidence
        );
        let request = PreheatRequest::from_descriptors(target, view, &tiles, PreheatPriority::Low);
        if !self.admit(&request, self.last_predicted, now) {
            return None;
        }
        self.last_predicted = Some(now);
        self.stats.predictions += 1;
        self.enqueue(request, now);
        Some(prediction)
    }

    /// Ask the supplier to warm the ring around `current`. Returns `false`
    /// when the ring was already requested for the same visible set.
    pub fn preheat_adjacent(
        &mut self,
        target: &RenderTarget,
        view: Option<MosaicView>,
        current: &[TileDescriptor],
    ) -> bool {
        if !self.options.enabled || current.is_empty() {
            return false;
        }
        let keys: Vec<TileKey> = current.iter().map(|t| target.key_for(t)).collect();
        if keys == self.adjacent_for {
            return false;
        }
        self.adjacent_for = keys;
        let request = AdjacentPreheat {
            surface: target.surface,
            sequence_id: target.sequence_id,
            tile_size: target.grid.tile_size,
            current_tiles: current
                .iter()
                .map(|t| PreheatTile {
                    level: t.level,
                    tile_x: t.col,
                    tile_y: t.row,
                })
                .collect(),
            radius: self.options.neighbor_radius,
            include_cross_level: self.options.include_cross_level,
            view,
            grid: Some(target.grid),
        };
        let supplier = Arc::clone(&self.supplier);
        let tx = self.tx.clone();
        self.in_flight += 1;
        runtime::spawn(self.spawner.as_ref(), async move {
            let result = supplier.preheat_adjacent(request).await;
            let _ = tx.send(Outcome {
                keys: Vec::new(),
                result,
            });
        });
        true
    }

    /// Collect finished calls and flush the queue once the debounce expired
    pub fn poll(&mut self, now: Instant) {
        while let Ok(outcome) = self.rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            match outcome.result {
                Ok(report) => {
                    self.stats.tiles_preheated += report.preheated as u64;
                }
                Err(e) => {
                    self.stats.failures += 1;
                    log::warn!("preheat of {} tiles failed: {e}", outcome.keys.len());
                    // Allow these tiles to be requested again
                    for key in &outcome.keys {
                        self.recent.pop(key);
                    }
                }
            }
        }
        if self.flush_at.map_or(false, |at| now >= at) {
            self.flush(now);
        }
    }

    /// Send every queued request now, one batch per mosaic
    pub fn flush(&mut self, now: Instant) {
        self.flush_at = None;
        let mut groups: Vec<((Surface, u64, u32, Option<MosaicView>), PreheatBatch)> = Vec::new();
        let mut seen: HashSet<TileKey> = HashSet::default();
        let ttl = self.options.recent_ttl();
        let max_batch = self.options.max_batch_size.max(1);

        for request in self.queue.drain(..) {
            let group = request.group();
            let index = match groups.iter().position(|(g, _)| *g == group) {
                Some(index) => index,
                None => {
                    groups.push((
                        group,
                        PreheatBatch {
                            surface: request.surface,
                            sequence_id: request.sequence_id,
                            tile_size: request.tile_size,
                            tiles: Vec::new(),
                            view: request.view.clone(),
                            priority: request.priority,
                        },
                    ));
                    groups.len() - 1
                }
            };
            let batch = &mut groups[index].1;
            batch.priority = batch.priority.max(request.priority);
            for tile in request.tiles {
                let key = TileKey::new(
                    request.surface,
                    request.sequence_id,
                    tile.level,
                    tile.tile_x,
                    tile.tile_y,
                    request.tile_size,
                );
                let fresh = self
                    .recent
                    .peek(&key)
                    .map_or(false, |sent| now.saturating_duration_since(*sent) < ttl);
                if fresh || !seen.insert(key) {
                    continue;
                }
                if batch.tiles.len() >= max_batch {
                    self.stats.dropped += 1;
                    continue;
                }
                batch.tiles.push(tile);
            }
        }

        for (_, batch) in groups {
            if batch.tiles.is_empty() {
                continue;
            }
            let keys: Vec<TileKey> = batch
                .tiles
                .iter()
                .map(|t| {
                    TileKey::new(
                        batch.surface,
                        batch.sequence_id,
                        t.level,
                        t.tile_x,
                        t.tile_y,
                        batch.tile_size,
                    )
                })
                .collect();
            for key in &keys {
                self.recent.put(*key, now);
            }
            self.stats.batches_sent += 1;
            self.stats.tiles_sent += batch.tiles.len() as u64;
            log::debug!(
                "preheating {} tiles of {} sequence {} ({:?})",
                batch.tiles.len(),
                batch.surface,
                batch.sequence_id,
                batch.priority
            );

            let supplier = Arc::clone(&self.supplier);
            let tx = self.tx.clone();
            self.in_flight += 1;
            runtime::spawn(self.spawner.as_ref(), async move {
                let result = supplier.preheat_tiles(batch).await;
                let _ = tx.send(Outcome { keys, result });
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::Duration;
    use crate::runtime::InlineSpawner;
    use crate::tiles::key::TileRequest;
    use crate::tiles::tiling::TileGrid;
    use crate::Error;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSupplier {
        batches: Mutex<Vec<PreheatBatch>>,
        fail: AtomicBool,
    }

    impl RecordingSupplier {
        fn batches(&self) -> Vec<PreheatBatch> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TileSupplier for RecordingSupplier {
        fn tile_url(&self, _request: &TileRequest) -> String {
            String::new()
        }

        async fn fetch_tile(&self, _request: &TileRequest) -> Result<Vec<u8>> {
            Err(Error::Supplier("offline".to_string()))
        }

        async fn preheat_tiles(&self, batch: PreheatBatch) -> Result<PreheatReport> {
            let count = batch.tiles.len();
            self.batches.lock().unwrap().push(batch);
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Supplier("preheat rejected".to_string()));
            }
            Ok(PreheatReport { preheated: count })
        }
    }

    fn target(sequence_id: u64) -> RenderTarget {
        RenderTarget {
            surface: Surface::Top,
            sequence_id,
            grid: TileGrid::new(16384.0, 1024.0, 512),
        }
    }

    fn scheduler(supplier: &Arc<RecordingSupplier>) -> PreheatScheduler {
        PreheatScheduler::new(supplier.clone(), Arc::new(InlineSpawner), PreheatOptions::default())
    }

    fn tiles(target: &RenderTarget, cols: std::ops::Range<u32>) -> Vec<TileDescriptor> {
        cols.filter_map(|c| target.grid.descriptor(0, c, 0)).collect()
    }

    #[test]
    fn test_debounced_flush() {
        let supplier = Arc::new(RecordingSupplier::default());
        let mut scheduler = scheduler(&supplier);
        let t0 = Instant::now();
        let target = target(1);

        let request = PreheatRequest::from_descriptors(&target, None, &tiles(&target, 0..4), PreheatPriority::Normal);
        assert!(scheduler.request(request, t0));
        scheduler.poll(t0 + Duration::from_millis(10));
        assert!(supplier.batches().is_empty());

        scheduler.poll(t0 + Duration::from_millis(60));
        let batches = supplier.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].tiles.len(), 4);
        assert_eq!(scheduler.queue_len(), 0);

        scheduler.poll(t0 + Duration::from_millis(70));
        assert_eq!(scheduler.stats().tiles_preheated, 4);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[test]
    fn test_throttle_unless_immediate() {
        let supplier = Arc::new(RecordingSupplier::default());
        let mut scheduler = scheduler(&supplier);
        let t0 = Instant::now();
        let target = target(1);
        let make = |cols| {
            PreheatRequest::from_descriptors(&target, None, &tiles(&target, cols), PreheatPriority::Normal)
        };

        assert!(scheduler.request(make(0..2), t0));
        assert!(!scheduler.request(make(2..4), t0 + Duration::from_millis(100)));
        assert_eq!(scheduler.stats().throttled, 1);

        // Immediate requests skip the throttle and the debounce
        assert!(scheduler.request(make(2..4).immediate(), t0 + Duration::from_millis(120)));
        let batches = supplier.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].tiles.len(), 4);

        assert!(scheduler.request(make(4..6), t0 + Duration::from_millis(400)));
    }

    #[test]
    fn test_recently_preheated_tiles_are_skipped() {
        let supplier = Arc::new(RecordingSupplier::default());
        let mut scheduler = scheduler(&supplier);
        let t0 = Instant::now();
        let target = target(1);

        let request = PreheatRequest::from_descriptors(&target, None, &tiles(&target, 0..3), PreheatPriority::Normal);
        scheduler.request(request.clone().immediate(), t0);
        let key = target.key_for(&tiles(&target, 0..1)[0]);
        assert!(scheduler.is_recent(&key, t0 + Duration::from_secs(1)));

        scheduler.request(request.clone().immediate(), t0 + Duration::from_secs(1));
        assert_eq!(supplier.batches().len(), 1);

        // Past the TTL the same tiles go out again
        scheduler.request(request.immediate(), t0 + Duration::from_secs(31));
        assert_eq!(supplier.batches().len(), 2);
    }

    #[test]
    fn test_grouping_and_batch_cap() {
        let supplier = Arc::new(RecordingSupplier::default());
        let mut scheduler = PreheatScheduler::new(
            supplier.clone(),
            Arc::new(InlineSpawner),
            PreheatOptions {
                max_batch_size: 5,
                min_interval_ms: 0,
                ..PreheatOptions::default()
            },
        );
        let t0 = Instant::now();
        let a = target(1);
        let b = target(2);

        scheduler.request(
            PreheatRequest::from_descriptors(&a, None, &tiles(&a, 0..8), PreheatPriority::Low),
            t0,
        );
        scheduler.request(
            PreheatRequest::from_descriptors(&b, None, &tiles(&b, 0..2), PreheatPriority::Normal),
            t0,
        );
        scheduler.request(
            PreheatRequest::from_descriptors(&a, None, &tiles(&a, 0..2), PreheatPriority::High),
            t0,
        );
        scheduler.flush(t0);

        let batches = supplier.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].sequence_id, 1);
        assert_eq!(batches[0].tiles.len(), 5);
        assert_eq!(batches[0].priority, PreheatPriority::High);
        assert_eq!(batches[1].sequence_id, 2);
        assert_eq!(batches[1].tiles.len(), 2);
        assert_eq!(scheduler.stats().dropped, 3);
    }

    #[test]
    fn test_failed_batch_can_be_retried() {
        let supplier = Arc::new(RecordingSupplier::default());
        supplier.fail.store(true, Ordering::SeqCst);
        let mut scheduler = scheduler(&supplier);
        let t0 = Instant::now();
        let target = target(1);

        let request = PreheatRequest::from_descriptors(&target, None, &tiles(&target, 0..2), PreheatPriority::Normal);
        scheduler.request(request.clone().immediate(), t0);
        scheduler.poll(t0);
        assert_eq!(scheduler.stats().failures, 1);
        let key = target.key_for(&tiles(&target, 0..1)[0]);
        assert!(!scheduler.is_recent(&key, t0));

        supplier.fail.store(false, Ordering::SeqCst);
        scheduler.request(request.immediate(), t0);
        assert_eq!(supplier.batches().len(), 2);
    }

    #[test]
    fn test_visible_preheat_includes_neighbours() {
        let supplier = Arc::new(RecordingSupplier::default());
        let mut scheduler = scheduler(&supplier);
        let target = target(1);
        let visible = tiles(&target, 3..4);

        scheduler.preheat_visible(&target, None, &visible, true, Instant::now());
        let batches = supplier.batches();
        // Tile (3,0) plus its in-bounds ring on a two-row grid
        assert_eq!(batches[0].tiles.len(), 6);
        assert_eq!(batches[0].priority, PreheatPriority::High);
    }

    #[test]
    fn test_confident_prediction_preheats_ahead() {
        let supplier = Arc::new(RecordingSupplier::default());
        let mut scheduler = scheduler(&supplier);
        let t0 = Instant::now();
        let target = target(1);

        let first = scheduler.observe_viewport(
            &target,
            None,
            UserActionKind::Drag,
            Rect::new(0.0, 0.0, 1024.0, 512.0),
            1.0,
            t0,
        );
        assert!(first.is_none());
        let prediction = scheduler
            .observe_viewport(
                &target,
                None,
                UserActionKind::Drag,
                Rect::new(400.0, 0.0, 1024.0, 512.0),
                1.0,
                t0 + Duration::from_millis(100),
            )
            .unwrap();
        assert!((prediction.viewport.x - 1000.0).abs() < 1e-9);

        scheduler.poll(t0 + Duration::from_millis(200));
        let batches = supplier.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].priority, PreheatPriority::Low);
        // Columns 1..=3 cover x in [1000, 2024)
        let cols: Vec<u32> = batches[0].tiles.iter().map(|t| t.tile_x).collect();
        assert_eq!(cols, vec![1, 2, 3]);
    }

    #[test]
    fn test_prediction_is_not_throttled_by_visible_preheat() {
        let supplier = Arc::new(RecordingSupplier::default());
        let mut scheduler = scheduler(&supplier);
        let t0 = Instant::now();
        let target = target(1);
        let t1 = t0 + Duration::from_millis(100);

        scheduler.observe_viewport(&target, None, UserActionKind::Pan, Rect::new(0.0, 0.0, 1024.0, 512.0), 1.0, t0);
        // Same frame: visible tiles first, then the prediction
        assert!(scheduler.preheat_visible(&target, None, &tiles(&target, 0..1), false, t1));
        let prediction = scheduler.observe_viewport(
            &target,
            None,
            UserActionKind::Pan,
            Rect::new(400.0, 0.0, 1024.0, 512.0),
            1.0,
            t1,
        );
        assert!(prediction.is_some());
        assert_eq!(scheduler.stats().throttled, 0);
        assert_eq!(scheduler.stats().predictions, 1);

        scheduler.poll(t1 + Duration::from_millis(60));
        let batches = supplier.batches();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].tiles.iter().any(|t| t.tile_x == 3));

        // A second prediction inside the interval is still throttled
        let again = scheduler.observe_viewport(
            &target,
            None,
            UserActionKind::Pan,
            Rect::new(800.0, 0.0, 1024.0, 512.0),
            1.0,
            t1 + Duration::from_millis(100),
        );
        assert!(again.is_none());
        assert_eq!(scheduler.stats().throttled, 1);
    }

    #[test]
    fn test_adjacent_ring_delegated_to_supplier_once_per_visible_set() {
        let supplier = Arc::new(RecordingSupplier::default());
        let mut scheduler = PreheatScheduler::new(
            supplier.clone(),
            Arc::new(InlineSpawner),
            PreheatOptions {
                adjacent_on_server: true,
                ..PreheatOptions::default()
            },
        );
        let t0 = Instant::now();
        let target = target(1);
        let visible = tiles(&target, 3..4);

        scheduler.preheat_visible(&target, None, &visible, true, t0);
        let batches = supplier.batches();
        assert_eq!(batches.len(), 2);
        // The ring goes out through the supplier's adjacent call
        assert_eq!(batches[0].priority, PreheatPriority::Normal);
        assert_eq!(batches[0].tiles.len(), 5);
        assert_eq!(batches[1].priority, PreheatPriority::High);
        assert_eq!(batches[1].tiles.len(), 1);

        // Unchanged visible set: no second ring
        assert!(!scheduler.preheat_adjacent(&target, None, &visible));
        assert!(scheduler.preheat_adjacent(&target, None, &tiles(&target, 4..5)));
        assert_eq!(supplier.batches().len(), 3);
        scheduler.poll(t0);
        assert_eq!(scheduler.in_flight(), 0);
    }
}
