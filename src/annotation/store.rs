//! Annotation persistence API and an in-memory implementation

use crate::core::geometry::Rect;
use crate::tiles::key::{MosaicView, Surface};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

/// Filter for listing persisted annotations
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationQuery {
    pub line_key: String,
    pub sequence_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface: Option<Surface>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<MosaicView>,
}

impl AnnotationQuery {
    pub fn matches(&self, stored: &StoredAnnotation) -> bool {
        stored.line_key == self.line_key
            && stored.sequence_id == self.sequence_id
            && self.surface.map_or(true, |s| s == stored.surface)
            && self.view.as_ref().map_or(true, |v| stored.view.as_ref() == Some(v))
    }
}

/// Server-side record of an annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnnotation {
    pub id: String,
    pub line_key: String,
    pub sequence_id: u64,
    pub surface: Surface,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<MosaicView>,
    pub bbox: Rect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark: Option<String>,
}

/// Payload of one item in a bulk create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAnnotation {
    pub line_key: String,
    pub sequence_id: u64,
    pub surface: Surface,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<MosaicView>,
    pub bbox: Rect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark: Option<String>,
}

/// Partial update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Rect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark: Option<String>,
}

impl AnnotationPatch {
    pub fn bbox(bbox: Rect) -> Self {
        Self {
            bbox: Some(bbox),
            ..Self::default()
        }
    }

    /// Fold a later patch into this one; later fields win
    pub fn merge(&mut self, later: AnnotationPatch) {
        if later.bbox.is_some() {
            self.bbox = later.bbox;
        }
        if later.class_id.is_some() {
            self.class_id = later.class_id;
        }
        if later.class_name.is_some() {
            self.class_name = later.class_name;
        }
        if later.mark.is_some() {
            self.mark = later.mark;
        }
    }

    pub fn apply_to(&self, stored: &mut StoredAnnotation) {
        if let Some(bbox) = self.bbox {
            stored.bbox = bbox;
        }
        if let Some(id) = self.class_id {
            stored.class_id = Some(id);
        }
        if let Some(name) = &self.class_name {
            stored.class_name = Some(name.clone());
        }
        if let Some(mark) = &self.mark {
            stored.mark = Some(mark.clone());
        }
    }
}

/// Persistence backend for annotations
#[async_trait]
pub trait AnnotationApi: Send + Sync {
    async fn list(&self, query: &AnnotationQuery) -> Result<Vec<StoredAnnotation>>;

    /// Creates every item; the result is in the same order as `items`
    async fn bulk_create(&self, items: Vec<NewAnnotation>) -> Result<Vec<StoredAnnotation>>;

    async fn update(&self, id: &str, patch: AnnotationPatch) -> Result<StoredAnnotation>;

    async fn delete(&self, id: &str) -> Result<()>;
}

/// Process-local store used by tests and the headless demo
#[derive(Debug, Default)]
pub struct InMemoryAnnotationStore {
    items: Mutex<Vec<StoredAnnotation>>,
    next_id: AtomicU64,
    fail_remaining: AtomicU32,
}

impl InMemoryAnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` calls fail with a persistence error
    pub fn fail_next(&self, count: u32) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<StoredAnnotation> {
        self.lock().map(|items| items.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<StoredAnnotation>>> {
        self.items
            .lock()
            .map_err(|_| Error::Persistence("annotation store poisoned".to_string()))
    }

    fn check_injected_failure(&self, operation: &str) -> Result<()> {
        let injected = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::Persistence(format!("{operation} rejected")));
        }
        Ok(())
    }
}

#[async_trait]
impl AnnotationApi for InMemoryAnnotationStore {
    async fn list(&self, query: &AnnotationQuery) -> Result<Vec<StoredAnnotation>> {
        self.check_injected_failure("list")?;
        let items = self.lock()?;
        Ok(items.iter().filter(|a| query.matches(a)).cloned().collect())
    }

    async fn bulk_create(&self, items: Vec<NewAnnotation>) -> Result<Vec<StoredAnnotation>> {
        self.check_injected_failure("create")?;
        let mut stored = self.lock()?;
        let created: Vec<StoredAnnotation> = items
            .into_iter()
            .map(|item| StoredAnnotation {
                id: format!("ann-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
                line_key: item.line_key,
                sequence_id: item.sequence_id,
                surface: item.surface,
                view: item.view,
                bbox: item.bbox,
                class_id: item.class_id,
                class_name: item.class_name,
                mark: item.mark,
            })
            .collect();
        stored.extend(created.iter().cloned());
        Ok(created)
    }

    async fn update(&self, id: &str, patch: AnnotationPatch) -> Result<StoredAnnotation> {
        self.check_injected_failure("update")?;
        let mut stored = self.lock()?;
        let item = stored
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::Persistence(format!("annotation {id} not found")))?;
        patch.apply_to(item);
        Ok(item.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.check_injected_failure("delete")?;
        let mut stored = self.lock()?;
        let before = stored.len();
        stored.retain(|a| a.id != id);
        if stored.len() == before {
            return Err(Error::Persistence(format!("annotation {id} not found")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn new_item(seq: u64, surface: Surface) -> NewAnnotation {
        NewAnnotation {
            line_key: "L1".to_string(),
            sequence_id: seq,
            surface,
            view: None,
            bbox: Rect::new(1.0, 2.0, 30.0, 40.0),
            class_id: Some(3),
            class_name: Some("scratch".to_string()),
            mark: None,
        }
    }

    #[test]
    fn test_create_list_update_delete() {
        let store = InMemoryAnnotationStore::new();
        let created = block_on(store.bulk_create(vec![
            new_item(7, Surface::Top),
            new_item(7, Surface::Bottom),
            new_item(8, Surface::Top),
        ]))
        .unwrap();
        assert_eq!(created.len(), 3);
        assert_ne!(created[0].id, created[1].id);

        let query = AnnotationQuery {
            line_key: "L1".to_string(),
            sequence_id: 7,
            surface: Some(Surface::Top),
            view: None,
        };
        let listed = block_on(store.list(&query)).unwrap();
        assert_eq!(listed, vec![created[0].clone()]);

        let moved = Rect::new(5.0, 5.0, 10.0, 10.0);
        let updated = block_on(store.update(&created[0].id, AnnotationPatch::bbox(moved))).unwrap();
        assert_eq!(updated.bbox, moved);
        assert_eq!(updated.class_id, Some(3));

        block_on(store.delete(&created[0].id)).unwrap();
        assert!(block_on(store.list(&query)).unwrap().is_empty());
        assert!(block_on(store.delete(&created[0].id)).is_err());
    }

    #[test]
    fn test_failure_injection() {
        let store = InMemoryAnnotationStore::new();
        store.fail_next(1);
        assert!(block_on(store.bulk_create(vec![new_item(1, Surface::Top)])).is_err());
        assert!(store.is_empty());
        assert!(block_on(store.bulk_create(vec![new_item(1, Surface::Top)])).is_ok());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_patch_merge() {
        let mut patch = AnnotationPatch::bbox(Rect::new(0.0, 0.0, 1.0, 1.0));
        patch.merge(AnnotationPatch {
            class_id: Some(2),
            ..AnnotationPatch::default()
        });
        patch.merge(AnnotationPatch::bbox(Rect::new(0.0, 0.0, 5.0, 5.0)));
        assert_eq!(patch.bbox, Some(Rect::new(0.0, 0.0, 5.0, 5.0)));
        assert_eq!(patch.class_id, Some(2));
    }
}
