//! Mode-based annotation interaction.
//!
//! The engine receives pointer input in world coordinates, keeps the draft,
//! submitted and measurement rectangles, and drives persistence through a
//! [`SyncQueue`]. Nothing here blocks: persistence outcomes are applied in
//! [`AnnotationEngine::poll`], which the viewer calls once per frame.

use super::classes::{DefectClass, DefectClassLookup};
use super::model::{
    Annotation, AnnotationContext, AnnotationStatus, Handle, LocalId, Measurement, SyncState,
};
use super::store::{
    AnnotationApi, AnnotationPatch, AnnotationQuery, NewAnnotation, StoredAnnotation,
};
use super::sync::{SyncEvent, SyncOp, SyncQueue};
use crate::core::config::{AnnotationOptions, CursorStyle};
use crate::core::geometry::{Point, Rect};
use crate::input::events::{EventHandled, ViewerEvent};
use crate::prelude::{Arc, HashMap, HashSet, Instant};
use crate::runtime::SharedSpawner;

/// Which drawing tool is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawMode {
    /// Annotation layer hidden and inert
    None,
    /// Select, move and resize existing rectangles; empty drags pan
    #[default]
    View,
    Measure,
    Mark,
}

impl DrawMode {
    pub fn is_edit_mode(self) -> bool {
        matches!(self, DrawMode::Measure | DrawMode::Mark)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Interaction {
    Idle,
    Drawing { start: Point, end: Point },
    Moving { id: LocalId, grab: Point, original: Rect },
    Resizing { id: LocalId, handle: Handle, original: Rect },
}

pub struct AnnotationEngine {
    options: AnnotationOptions,
    mode: DrawMode,
    context: Option<AnnotationContext>,
    /// Bumped on every context change; list responses for older ones are stale
    generation: u64,
    loading: bool,
    annotations: Vec<Annotation>,
    measurements: Vec<Measurement>,
    selected: Option<LocalId>,
    interaction: Interaction,
    pending_mark_rect: Option<Rect>,
    default_class: Option<DefectClass>,
    classes: Arc<dyn DefectClassLookup>,
    sync: SyncQueue,
    /// Server ids created since the last list was issued
    created_since_list: HashSet<String>,
    next_id: LocalId,
    events: Vec<ViewerEvent>,
}

impl AnnotationEngine {
    pub fn new(
        options: AnnotationOptions,
        api: Arc<dyn AnnotationApi>,
        classes: Arc<dyn DefectClassLookup>,
        spawner: SharedSpawner,
    ) -> Self {
        let sync = SyncQueue::new(api, spawner, options.retry.clone());
        Self {
            options,
            mode: DrawMode::default(),
            context: None,
            generation: 0,
            loading: false,
            annotations: Vec::new(),
            measurements: Vec::new(),
            selected: None,
            interaction: Interaction::Idle,
            pending_mark_rect: None,
            default_class: None,
            classes,
            sync,
            created_since_list: HashSet::default(),
            next_id: 0,
            events: Vec::new(),
        }
    }

    // ----- accessors -----

    pub fn mode(&self) -> DrawMode {
        self.mode
    }

    pub fn options(&self) -> &AnnotationOptions {
        &self.options
    }

    pub fn context(&self) -> Option<&AnnotationContext> {
        self.context.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn annotation(&self, id: LocalId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub fn drafts(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter().filter(|a| a.is_draft())
    }

    pub fn submitted(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter().filter(|a| a.is_submitted())
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn selected(&self) -> Option<LocalId> {
        self.selected
    }

    pub fn selected_annotation(&self) -> Option<&Annotation> {
        self.selected.and_then(|id| self.annotation(id))
    }

    /// Rectangle awaiting a class choice from the picker
    pub fn pending_mark_rect(&self) -> Option<Rect> {
        self.pending_mark_rect
    }

    /// Rubber-band rectangle of an in-progress drag
    pub fn drawing_rect(&self) -> Option<Rect> {
        match self.interaction {
            Interaction::Drawing { start, end } => Some(Rect::from_corners(start, end)),
            _ => None,
        }
    }

    pub fn is_interacting(&self) -> bool {
        self.interaction != Interaction::Idle
    }

    pub fn default_class(&self) -> Option<&DefectClass> {
        self.default_class.as_ref()
    }

    pub fn class_lookup(&self) -> &Arc<dyn DefectClassLookup> {
        &self.classes
    }

    pub fn sync_queue(&self) -> &SyncQueue {
        &self.sync
    }

    /// Events produced since the last call
    pub fn take_events(&mut self) -> Vec<ViewerEvent> {
        std::mem::take(&mut self.events)
    }

    // ----- configuration -----

    pub fn set_default_class(&mut self, class: Option<DefectClass>) {
        self.default_class = class;
    }

    pub fn set_auto_submit(&mut self, auto_submit: bool) {
        self.options.auto_submit = auto_submit;
    }

    /// Switch tools. Leaving measure clears measurements; leaving the edit
    /// modes for view or none discards drafts as well.
    pub fn set_mode(&mut self, mode: DrawMode) {
        if mode == self.mode {
            return;
        }
        let previous = self.mode;
        self.mode = mode;
        self.cancel_interaction();

        if previous == DrawMode::Measure {
            self.measurements.clear();
        }
        if matches!(mode, DrawMode::View | DrawMode::None) {
            self.discard_drafts();
            self.measurements.clear();
        }
        if mode == DrawMode::None {
            self.selected = None;
        }
        log::debug!("annotation mode {previous:?} -> {mode:?}");
        self.changed();
    }

    /// Load annotations for a new line/sequence/surface/view.
    ///
    /// Submitted annotations of the previous context are dropped and the
    /// list is re-fetched; drafts are kept.
    pub fn set_context(&mut self, context: AnnotationContext, now: Instant) -> bool {
        if self.context.as_ref() == Some(&context) {
            return false;
        }
        log::info!(
            "loading annotations for line {} sequence {} ({})",
            context.line_key,
            context.sequence_id,
            context.surface
        );
        self.context = Some(context);
        self.annotations.retain(|a| a.is_draft());
        if self.selected.map_or(false, |id| self.annotation(id).is_none()) {
            self.selected = None;
        }
        self.created_since_list.clear();
        self.reload(now);
        true
    }

    /// Re-fetch the current context from the persistence API
    pub fn reload(&mut self, now: Instant) {
        let Some(context) = &self.context else {
            return;
        };
        let query = AnnotationQuery {
            line_key: context.line_key.clone(),
            sequence_id: context.sequence_id,
            surface: Some(context.surface),
            view: context.view.clone(),
        };
        self.generation += 1;
        self.loading = true;
        self.created_since_list.clear();
        self.sync.enqueue(SyncOp::List {
            generation: self.generation,
            query,
        });
        self.sync.pump(now);
        self.changed();
    }

    // ----- pointer input (world coordinates) -----

    /// Hit-test and begin a drag. `scale` converts the handle tolerance
    /// from screen pixels to world units.
    pub fn pointer_down(&mut self, world: Point, scale: f64) -> EventHandled {
        if self.mode == DrawMode::None {
            return EventHandled::NotHandled;
        }
        if self.interaction != Interaction::Idle {
            return EventHandled::Handled;
        }
        if self.mode == DrawMode::Measure {
            self.interaction = Interaction::Drawing {
                start: world,
                end: world,
            };
            return EventHandled::Handled;
        }

        let tolerance = self.handle_tolerance(scale);
        if let Some((id, handle)) = self.handle_hit(world, tolerance) {
            if let Some(original) = self.annotation(id).map(|a| a.bbox) {
                self.select(Some(id));
                self.interaction = Interaction::Resizing {
                    id,
                    handle,
                    original,
                };
                return EventHandled::Handled;
            }
        }
        if let Some(hit) = self.body_hit(world) {
            let id = hit.id;
            let original = hit.bbox;
            self.select(Some(id));
            self.interaction = Interaction::Moving {
                id,
                grab: world,
                original,
            };
            return EventHandled::Handled;
        }

        self.select(None);
        if self.mode == DrawMode::Mark {
            self.interaction = Interaction::Drawing {
                start: world,
                end: world,
            };
            return EventHandled::Handled;
        }
        EventHandled::NotHandled
    }

    pub fn pointer_move(&mut self, world: Point) -> EventHandled {
        match self.interaction {
            Interaction::Idle => return EventHandled::NotHandled,
            Interaction::Drawing { start, .. } => {
                self.interaction = Interaction::Drawing { start, end: world };
            }
            Interaction::Moving { id, grab, original } => {
                let delta = world.subtract(&grab);
                self.set_bbox(id, original.translated(delta.x, delta.y));
            }
            Interaction::Resizing {
                id,
                handle,
                original,
            } => {
                self.set_bbox(id, handle.resize(&original, world));
            }
        }
        self.changed();
        EventHandled::Handled
    }

    /// Finish the current drag
    pub fn pointer_up(&mut self, world: Point, now: Instant) -> EventHandled {
        let interaction = std::mem::replace(&mut self.interaction, Interaction::Idle);
        match interaction {
            Interaction::Idle => EventHandled::NotHandled,
            Interaction::Drawing { start, .. } => {
                self.finish_drawing(Rect::from_corners(start, world), now);
                EventHandled::Handled
            }
            Interaction::Moving { id, grab, original } => {
                let delta = world.subtract(&grab);
                self.finish_edit(id, original.translated(delta.x, delta.y), original, now);
                EventHandled::Handled
            }
            Interaction::Resizing {
                id,
                handle,
                original,
            } => {
                self.finish_edit(id, handle.resize(&original, world), original, now);
                EventHandled::Handled
            }
        }
    }

    /// Abort the current drag, restoring an edited rectangle, and close the
    /// class picker
    pub fn cancel_interaction(&mut self) {
        match std::mem::replace(&mut self.interaction, Interaction::Idle) {
            Interaction::Moving { id, original, .. } | Interaction::Resizing { id, original, .. } => {
                self.set_bbox(id, original);
            }
            Interaction::Drawing { .. } | Interaction::Idle => {}
        }
        if self.pending_mark_rect.take().is_some() {
            log::debug!("class picker cancelled");
        }
        self.changed();
    }

    fn finish_drawing(&mut self, rect: Rect, now: Instant) {
        if !self.is_large_enough(&rect) {
            log::debug!("discarding {}x{} drag below minimum size", rect.width, rect.height);
            self.changed();
            return;
        }
        match self.mode {
            DrawMode::Measure => {
                self.next_id += 1;
                self.measurements.push(Measurement {
                    id: self.next_id,
                    rect,
                });
            }
            DrawMode::Mark => match self.default_class.clone() {
                Some(class) => {
                    self.create_draft(rect, class, now);
                }
                None => {
                    self.pending_mark_rect = Some(rect);
                    self.events.push(ViewerEvent::ClassPickerRequested { rect });
                }
            },
            DrawMode::View | DrawMode::None => {}
        }
        self.changed();
    }

    fn finish_edit(&mut self, id: LocalId, bbox: Rect, original: Rect, now: Instant) {
        if !self.is_large_enough(&bbox) {
            self.set_bbox(id, original);
            self.changed();
            return;
        }
        self.set_bbox(id, bbox);
        if bbox != original {
            self.push_update(id, AnnotationPatch::bbox(bbox), now);
        }
        self.changed();
    }

    // ----- class picker -----

    /// Answer the class picker; creates the pending mark as a draft
    pub fn select_class(&mut self, class: DefectClass, now: Instant) -> Option<LocalId> {
        let rect = self.pending_mark_rect.take()?;
        let id = self.create_draft(rect, class, now);
        self.changed();
        id
    }

    pub fn cancel_class_picker(&mut self) {
        if self.pending_mark_rect.take().is_some() {
            self.changed();
        }
    }

    /// Relabel the selected annotation
    pub fn set_selected_class(&mut self, class: DefectClass, now: Instant) -> bool {
        let Some(id) = self.selected else {
            return false;
        };
        let Some(annotation) = self.annotations.iter_mut().find(|a| a.id == id) else {
            return false;
        };
        annotation.class_id = Some(class.id);
        annotation.class_name = Some(class.name.clone());
        self.push_update(
            id,
            AnnotationPatch {
                class_id: Some(class.id),
                class_name: Some(class.name),
                ..AnnotationPatch::default()
            },
            now,
        );
        self.changed();
        true
    }

    /// New draft in the current context; refused until a context is set
    fn create_draft(&mut self, rect: Rect, class: DefectClass, now: Instant) -> Option<LocalId> {
        let Some((surface, view)) = self.context.as_ref().map(|c| (c.surface, c.view.clone())) else {
            log::warn!("no annotation context, dropping {}x{} mark", rect.width, rect.height);
            return None;
        };
        self.next_id += 1;
        let id = self.next_id;
        let mut draft = Annotation::draft(id, rect, surface, view);
        draft.class_id = Some(class.id);
        draft.class_name = Some(class.name);
        self.annotations.push(draft);
        if self.options.auto_submit {
            self.submit(id, now);
        }
        Some(id)
    }

    // ----- bulk operations -----

    /// Persist one draft
    pub fn submit(&mut self, id: LocalId, now: Instant) -> bool {
        self.submit_ids(&[id], now) == 1
    }

    /// Persist every draft that is not already being created, in one call
    pub fn submit_all_drafts(&mut self, now: Instant) -> usize {
        let ids: Vec<LocalId> = self.drafts().map(|a| a.id).collect();
        self.submit_ids(&ids, now)
    }

    fn submit_ids(&mut self, ids: &[LocalId], now: Instant) -> usize {
        let Some(context) = self.context.clone() else {
            log::warn!("cannot submit annotations without a context");
            return 0;
        };
        let mut local_ids = Vec::new();
        let mut items = Vec::new();
        for annotation in self.annotations.iter_mut() {
            if !ids.contains(&annotation.id)
                || !annotation.is_draft()
                || annotation.sync_state == SyncState::Pending
            {
                continue;
            }
            annotation.sync_state = SyncState::Pending;
            local_ids.push(annotation.id);
            items.push(NewAnnotation {
                line_key: context.line_key.clone(),
                sequence_id: context.sequence_id,
                surface: annotation.surface,
                view: annotation.view.clone(),
                bbox: annotation.bbox,
                class_id: annotation.class_id,
                class_name: annotation.class_name.clone(),
                mark: annotation.mark.clone(),
            });
        }
        let count = items.len();
        if count > 0 {
            log::info!("submitting {count} annotation(s)");
            self.sync.enqueue(SyncOp::Create { local_ids, items });
            self.sync.pump(now);
            self.changed();
        }
        count
    }

    /// Discard every draft
    pub fn clear_unsubmitted(&mut self) {
        self.discard_drafts();
        self.changed();
    }

    pub fn clear_measurements(&mut self) {
        if !self.measurements.is_empty() {
            self.measurements.clear();
            self.changed();
        }
    }

    /// Remove the selected annotation; submitted ones are also deleted on
    /// the server
    pub fn delete_selected(&mut self, now: Instant) -> bool {
        let Some(id) = self.selected.take() else {
            return false;
        };
        let Some(index) = self.annotations.iter().position(|a| a.id == id) else {
            return false;
        };
        if matches!(self.interaction, Interaction::Moving { id: i, .. } | Interaction::Resizing { id: i, .. } if i == id)
        {
            self.interaction = Interaction::Idle;
        }
        let removed = self.annotations.remove(index);
        if let Some(server_id) = removed.server_id.clone() {
            self.sync.enqueue(SyncOp::Delete {
                local_id: id,
                server_id,
                snapshot: Some(Box::new(removed)),
            });
            self.sync.pump(now);
        }
        self.changed();
        true
    }

    /// Retry persistence for everything marked unsynced
    pub fn resync(&mut self, now: Instant) -> usize {
        let unsynced: Vec<(LocalId, bool)> = self
            .annotations
            .iter()
            .filter(|a| a.sync_state == SyncState::Unsynced)
            .map(|a| (a.id, a.is_draft()))
            .collect();
        let drafts: Vec<LocalId> = unsynced.iter().filter(|(_, d)| *d).map(|(id, _)| *id).collect();
        let mut count = self.submit_ids(&drafts, now);
        for (id, _) in unsynced.into_iter().filter(|(_, d)| !*d) {
            let Some(annotation) = self.annotation(id) else {
                continue;
            };
            let annotation = annotation.clone();
            if annotation.server_id.is_some() {
                if self.sync.has_pending(id) {
                    continue;
                }
                let patch = AnnotationPatch {
                    bbox: Some(annotation.bbox),
                    class_id: annotation.class_id,
                    class_name: annotation.class_name.clone(),
                    mark: annotation.mark.clone(),
                };
                self.push_update(id, patch, now);
                count += 1;
            }
        }
        count
    }

    // ----- persistence outcomes -----

    /// Apply finished persistence calls and dispatch queued ones
    pub fn poll(&mut self, now: Instant) {
        let events = self.sync.poll(now);
        for event in events {
            self.apply(event, now);
        }
        self.sync.pump(now);
    }

    fn apply(&mut self, event: SyncEvent, now: Instant) {
        match event {
            SyncEvent::Listed { generation, items } => self.apply_list(generation, items),
            SyncEvent::Created { local_ids, stored } => self.apply_created(local_ids, stored, now),
            SyncEvent::Updated { local_id, .. } => {
                let idle = !self.sync.has_pending(local_id);
                if let Some(annotation) = self.annotations.iter_mut().find(|a| a.id == local_id) {
                    if idle {
                        annotation.sync_state = SyncState::Synced;
                    }
                }
                self.changed();
            }
            SyncEvent::Deleted { local_id } => {
                log::debug!("annotation {local_id} deleted on server");
            }
            SyncEvent::GaveUp { op, error } => self.apply_give_up(op, &error),
        }
    }

    fn apply_list(&mut self, generation: u64, items: Vec<StoredAnnotation>) {
        if generation != self.generation {
            log::debug!("ignoring stale annotation list (generation {generation})");
            return;
        }
        self.loading = false;

        // Local copies with unsent changes win over the server version
        let mut local_by_server: HashMap<String, Annotation> = HashMap::default();
        let mut kept = Vec::new();
        for annotation in self.annotations.drain(..) {
            match (&annotation.server_id, annotation.status) {
                (_, AnnotationStatus::Draft) => kept.push(annotation),
                (Some(server_id), AnnotationStatus::Submitted) => {
                    local_by_server.insert(server_id.clone(), annotation);
                }
                (None, AnnotationStatus::Submitted) => {}
            }
        }

        let listed: HashSet<String> = items.iter().map(|s| s.id.clone()).collect();
        let mut submitted = Vec::new();
        for stored in items {
            match local_by_server.remove(&stored.id) {
                Some(local) if local.sync_state != SyncState::Synced => submitted.push(local),
                Some(local) => submitted.push(Self::from_stored(local.id, stored)),
                None => {
                    self.next_id += 1;
                    submitted.push(Self::from_stored(self.next_id, stored));
                }
            }
        }
        // Created after this list was requested
        for (server_id, local) in local_by_server {
            if self.created_since_list.contains(&server_id) && !listed.contains(&server_id) {
                submitted.push(local);
            }
        }
        submitted.sort_by_key(|a| a.id);

        log::info!("loaded {} annotation(s), kept {} draft(s)", submitted.len(), kept.len());
        submitted.extend(kept);
        self.annotations = submitted;
        if self.selected.map_or(false, |id| self.annotation(id).is_none()) {
            self.selected = None;
        }
        self.changed();
    }

    fn apply_created(&mut self, local_ids: Vec<LocalId>, stored: Vec<StoredAnnotation>, now: Instant) {
        for (local_id, stored) in local_ids.into_iter().zip(stored) {
            self.created_since_list.insert(stored.id.clone());
            let Some(annotation) = self.annotations.iter_mut().find(|a| a.id == local_id) else {
                // Discarded while the create was in flight
                log::debug!("removing orphaned annotation {}", stored.id);
                self.sync.enqueue(SyncOp::Delete {
                    local_id,
                    server_id: stored.id,
                    snapshot: None,
                });
                continue;
            };
            annotation.status = AnnotationStatus::Submitted;
            annotation.server_id = Some(stored.id.clone());
            if annotation.bbox != stored.bbox || annotation.class_id != stored.class_id {
                let patch = AnnotationPatch {
                    bbox: Some(annotation.bbox),
                    class_id: annotation.class_id,
                    class_name: annotation.class_name.clone(),
                    mark: None,
                };
                self.push_update(local_id, patch, now);
            } else {
                annotation.sync_state = SyncState::Synced;
            }
        }
        self.changed();
    }

    fn apply_give_up(&mut self, op: SyncOp, error: &crate::Error) {
        match op {
            SyncOp::List { generation, .. } if generation != self.generation => {
                log::debug!("ignoring failed stale annotation list (generation {generation}): {error}");
            }
            SyncOp::List { .. } => {
                log::warn!("failed to load annotations: {error}");
                self.loading = false;
            }
            SyncOp::Delete {
                snapshot: Some(snapshot),
                ..
            } => {
                let mut restored = *snapshot;
                restored.sync_state = SyncState::Unsynced;
                if self.annotation(restored.id).is_none() {
                    self.annotations.push(restored);
                }
            }
            SyncOp::Delete { snapshot: None, .. } => {}
            op => {
                for id in op.local_ids() {
                    if let Some(annotation) = self.annotations.iter_mut().find(|a| a.id == id) {
                        annotation.sync_state = SyncState::Unsynced;
                    }
                }
            }
        }
        self.changed();
    }

    fn from_stored(id: LocalId, stored: StoredAnnotation) -> Annotation {
        Annotation {
            id,
            bbox: stored.bbox,
            status: AnnotationStatus::Submitted,
            class_id: stored.class_id,
            class_name: stored.class_name,
            mark: stored.mark,
            surface: stored.surface,
            view: stored.view,
            server_id: Some(stored.id),
            sync_state: SyncState::Synced,
        }
    }

    // ----- hit testing -----

    fn handle_tolerance(&self, scale: f64) -> f64 {
        self.options.handle_tolerance_px / scale.max(f64::EPSILON)
    }

    /// Corner handle under `world`; the selected annotation wins, then the
    /// topmost one
    fn handle_hit(&self, world: Point, tolerance: f64) -> Option<(LocalId, Handle)> {
        if let Some(selected) = self.selected_annotation() {
            if let Some(handle) = selected.handle_at(world, tolerance) {
                return Some((selected.id, handle));
            }
        }
        self.annotations
            .iter()
            .rev()
            .find_map(|a| a.handle_at(world, tolerance).map(|h| (a.id, h)))
    }

    fn body_hit(&self, world: Point) -> Option<&Annotation> {
        self.annotations.iter().rev().find(|a| a.contains(world))
    }

    /// Cursor for the pointer at `world`
    pub fn cursor_at(&self, world: Point, scale: f64) -> CursorStyle {
        match self.interaction {
            Interaction::Drawing { .. } => return CursorStyle::Crosshair,
            Interaction::Moving { .. } => return CursorStyle::Move,
            Interaction::Resizing { handle, .. } => return resize_cursor(handle),
            Interaction::Idle => {}
        }
        match self.mode {
            DrawMode::None => CursorStyle::Default,
            DrawMode::Measure => CursorStyle::Crosshair,
            DrawMode::View | DrawMode::Mark => {
                if let Some((_, handle)) = self.handle_hit(world, self.handle_tolerance(scale)) {
                    resize_cursor(handle)
                } else if self.body_hit(world).is_some() {
                    CursorStyle::Move
                } else if self.mode == DrawMode::Mark {
                    CursorStyle::Crosshair
                } else {
                    CursorStyle::Grab
                }
            }
        }
    }

    // ----- helpers -----

    /// Sides exactly `min_size` long are kept; only smaller ones are rejected
    fn is_large_enough(&self, rect: &Rect) -> bool {
        rect.width >= self.options.min_size && rect.height >= self.options.min_size
    }

    fn select(&mut self, id: Option<LocalId>) {
        if self.selected != id {
            self.selected = id;
            self.changed();
        }
    }

    fn set_bbox(&mut self, id: LocalId, bbox: Rect) {
        if let Some(annotation) = self.annotations.iter_mut().find(|a| a.id == id) {
            annotation.bbox = bbox;
        }
    }

    /// Queue a server update for a submitted annotation. Drafts with a
    /// create in flight are reconciled when the create completes.
    fn push_update(&mut self, id: LocalId, patch: AnnotationPatch, now: Instant) {
        let Some(annotation) = self.annotations.iter_mut().find(|a| a.id == id) else {
            return;
        };
        let Some(server_id) = annotation.server_id.clone() else {
            return;
        };
        annotation.sync_state = SyncState::Pending;
        self.sync.enqueue(SyncOp::Update {
            local_id: id,
            server_id,
            patch,
        });
        self.sync.pump(now);
    }

    fn discard_drafts(&mut self) {
        let before = self.annotations.len();
        self.annotations.retain(|a| !a.is_draft());
        if self.annotations.len() != before {
            log::debug!("discarded {} draft(s)", before - self.annotations.len());
        }
        if self.selected.map_or(false, |id| self.annotation(id).is_none()) {
            self.selected = None;
        }
        self.pending_mark_rect = None;
    }

    fn changed(&mut self) {
        if self.events.last() != Some(&ViewerEvent::AnnotationsChanged) {
            self.events.push(ViewerEvent::AnnotationsChanged);
        }
    }
}

fn resize_cursor(handle: Handle) -> CursorStyle {
    match handle {
        Handle::TopLeft | Handle::BottomRight => CursorStyle::ResizeNwse,
        Handle::TopRight | Handle::BottomLeft => CursorStyle::ResizeNesw,
    }
}
