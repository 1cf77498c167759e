//! Interactive annotation layer: measurement boxes and labelled defect marks
//! with server synchronisation

pub mod classes;
pub mod draw;
pub mod engine;
pub mod model;
pub mod store;
pub mod sync;

pub use classes::{DefectClass, DefectClassLookup, StaticClassTable};
pub use draw::{draw_annotations, AnnotationPalette};
pub use engine::{AnnotationEngine, DrawMode};
pub use model::{Annotation, AnnotationContext, AnnotationStatus, Handle, LocalId, Measurement, SyncState};
pub use store::{
    AnnotationApi, AnnotationPatch, AnnotationQuery, InMemoryAnnotationStore, NewAnnotation,
    StoredAnnotation,
};
pub use sync::{SyncEvent, SyncOp, SyncQueue};
