//! Serialized annotation persistence with retry
//!
//! Every create/update/delete/list call goes through a [`SyncQueue`]. At
//! most one call per annotation is in flight, and calls for the same
//! annotation are dispatched in the order they were queued, so an edit can
//! never overtake its own earlier edit. Failed calls are retried with
//! exponential backoff; after the last attempt a [`SyncEvent::GaveUp`] is
//! reported and the engine marks the annotation unsynced.

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::model::{Annotation, LocalId};
use super::store::{AnnotationApi, AnnotationPatch, AnnotationQuery, NewAnnotation, StoredAnnotation};
use crate::core::config::RetryPolicy;
use crate::prelude::{Arc, HashMap, HashSet, Instant, VecDeque};
use crate::runtime::{self, SharedSpawner};
use crate::{Error, Result};

type OpId = u64;

/// One persistence call
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOp {
    /// Bulk create; `local_ids[i]` is the annotation behind `items[i]`
    Create {
        local_ids: Vec<LocalId>,
        items: Vec<NewAnnotation>,
    },
    Update {
        local_id: LocalId,
        server_id: String,
        patch: AnnotationPatch,
    },
    /// `snapshot` is restored if the delete finally fails
    Delete {
        local_id: LocalId,
        server_id: String,
        snapshot: Option<Box<Annotation>>,
    },
    List {
        generation: u64,
        query: AnnotationQuery,
    },
}

impl SyncOp {
    pub fn local_ids(&self) -> Vec<LocalId> {
        match self {
            SyncOp::Create { local_ids, .. } => local_ids.clone(),
            SyncOp::Update { local_id, .. } | SyncOp::Delete { local_id, .. } => vec![*local_id],
            SyncOp::List { .. } => Vec::new(),
        }
    }

    fn touches(&self, id: LocalId) -> bool {
        match self {
            SyncOp::Create { local_ids, .. } => local_ids.contains(&id),
            SyncOp::Update { local_id, .. } | SyncOp::Delete { local_id, .. } => *local_id == id,
            SyncOp::List { .. } => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SyncOp::Create { .. } => "create",
            SyncOp::Update { .. } => "update",
            SyncOp::Delete { .. } => "delete",
            SyncOp::List { .. } => "list",
        }
    }
}

/// Outcome reported back to the engine
#[derive(Debug)]
pub enum SyncEvent {
    Created {
        local_ids: Vec<LocalId>,
        stored: Vec<StoredAnnotation>,
    },
    Updated {
        local_id: LocalId,
        stored: StoredAnnotation,
    },
    Deleted {
        local_id: LocalId,
    },
    Listed {
        generation: u64,
        items: Vec<StoredAnnotation>,
    },
    GaveUp {
        op: SyncOp,
        error: Error,
    },
}

#[derive(Debug)]
enum Response {
    Created(Vec<StoredAnnotation>),
    Updated(StoredAnnotation),
    Deleted,
    Listed(Vec<StoredAnnotation>),
}

struct Completion {
    id: OpId,
    result: Result<Response>,
}

#[derive(Debug, Clone)]
struct QueuedOp {
    id: OpId,
    op: SyncOp,
    attempts: u32,
    not_before: Option<Instant>,
}

pub struct SyncQueue {
    api: Arc<dyn AnnotationApi>,
    spawner: SharedSpawner,
    policy: RetryPolicy,
    queue: VecDeque<QueuedOp>,
    in_flight: HashMap<OpId, QueuedOp>,
    next_op: OpId,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl SyncQueue {
    pub fn new(api: Arc<dyn AnnotationApi>, spawner: SharedSpawner, policy: RetryPolicy) -> Self {
        let (tx, rx) = unbounded();
        Self {
            api,
            spawner,
            policy,
            queue: VecDeque::new(),
            in_flight: HashMap::default(),
            next_op: 0,
            tx,
            rx,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn api(&self) -> &Arc<dyn AnnotationApi> {
        &self.api
    }

    /// Queue a call. Updates fold into a still-queued update for the same
    /// annotation; a delete drops queued updates it would make pointless.
    pub fn enqueue(&mut self, op: SyncOp) {
        match op {
            SyncOp::Update {
                local_id,
                server_id,
                patch,
            } => {
                let last = self.queue.iter_mut().rev().find(|q| q.op.touches(local_id));
                if let Some(QueuedOp {
                    op: SyncOp::Update { patch: queued, .. },
                    ..
                }) = last
                {
                    queued.merge(patch);
                    return;
                }
                self.push(SyncOp::Update {
                    local_id,
                    server_id,
                    patch,
                });
            }
            SyncOp::Delete { local_id, .. } => {
                self.queue
                    .retain(|q| !matches!(&q.op, SyncOp::Update { local_id: id, .. } if *id == local_id));
                self.push(op);
            }
            op => self.push(op),
        }
    }

    fn push(&mut self, op: SyncOp) {
        self.next_op += 1;
        log::debug!("queued annotation {} (op {})", op.name(), self.next_op);
        self.queue.push_back(QueuedOp {
            id: self.next_op,
            op,
            attempts: 0,
            not_before: None,
        });
    }

    /// Whether any call for `id` is queued or in flight
    pub fn has_pending(&self, id: LocalId) -> bool {
        self.queue.iter().any(|q| q.op.touches(id)) || self.in_flight.values().any(|q| q.op.touches(id))
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Collect finished calls, schedule retries, then dispatch what is ready
    pub fn poll(&mut self, now: Instant) -> Vec<SyncEvent> {
        let events = self.drain(now);
        self.pump(now);
        events
    }

    /// Collect finished calls without dispatching new ones
    pub fn drain(&mut self, now: Instant) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.rx.try_recv() {
            let Some(mut queued) = self.in_flight.remove(&completion.id) else {
                continue;
            };
            match completion.result {
                Ok(response) => events.push(Self::success_event(queued.op, response)),
                Err(error) => {
                    queued.attempts += 1;
                    if queued.attempts >= self.policy.max_attempts {
                        log::warn!(
                            "annotation {} failed after {} attempts, giving up: {error}",
                            queued.op.name(),
                            queued.attempts
                        );
                        events.push(SyncEvent::GaveUp {
                            op: queued.op,
                            error,
                        });
                    } else {
                        let delay = self.policy.delay(queued.attempts);
                        log::warn!(
                            "annotation {} failed (attempt {}), retrying in {delay:?}: {error}",
                            queued.op.name(),
                            queued.attempts
                        );
                        queued.not_before = Some(now + delay);
                        // Retries go ahead of later calls for the same annotation
                        self.queue.push_front(queued);
                    }
                }
            }
        }
        events
    }

    fn success_event(op: SyncOp, response: Response) -> SyncEvent {
        match (op, response) {
            (SyncOp::Create { local_ids, .. }, Response::Created(stored)) => {
                SyncEvent::Created { local_ids, stored }
            }
            (SyncOp::Update { local_id, .. }, Response::Updated(stored)) => {
                SyncEvent::Updated { local_id, stored }
            }
            (SyncOp::Delete { local_id, .. }, Response::Deleted) => SyncEvent::Deleted { local_id },
            (SyncOp::List { generation, .. }, Response::Listed(items)) => {
                SyncEvent::Listed { generation, items }
            }
            (op, response) => SyncEvent::GaveUp {
                error: Error::Persistence(format!(
                    "unexpected response {response:?} to {}",
                    op.name()
                )),
                op,
            },
        }
    }

    /// Dispatch every queued call whose annotations are not busy
    pub fn pump(&mut self, now: Instant) {
        let mut busy: HashSet<LocalId> = self
            .in_flight
            .values()
            .flat_map(|q| q.op.local_ids())
            .collect();
        let mut remaining = VecDeque::with_capacity(self.queue.len());

        while let Some(queued) = self.queue.pop_front() {
            let ids = queued.op.local_ids();
            let blocked = ids.iter().any(|id| busy.contains(id));
            let waiting = queued.not_before.map_or(false, |t| now < t);
            // Later calls for these annotations must wait behind this one
            busy.extend(ids);
            if blocked || waiting {
                remaining.push_back(queued);
            } else {
                self.dispatch(queued);
            }
        }
        self.queue = remaining;
    }

    fn dispatch(&mut self, queued: QueuedOp) {
        let id = queued.id;
        let op = queued.op.clone();
        self.in_flight.insert(id, queued);

        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        runtime::spawn(self.spawner.as_ref(), async move {
            let result = match op {
                SyncOp::Create { items, .. } => api.bulk_create(items).await.map(Response::Created),
                SyncOp::Update {
                    server_id, patch, ..
                } => api.update(&server_id, patch).await.map(Response::Updated),
                SyncOp::Delete { server_id, .. } => {
                    api.delete(&server_id).await.map(|_| Response::Deleted)
                }
                SyncOp::List { query, .. } => api.list(&query).await.map(Response::Listed),
            };
            let _ = tx.send(Completion { id, result });
        });
    }
}
