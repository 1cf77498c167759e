//! Predictive server-side tile preheating

pub mod history;
pub mod scheduler;

pub use history::{ActionHistory, UserActionKind, UserActionSample, ViewportPrediction};
pub use scheduler::{PreheatRequest, PreheatScheduler, PreheatStats};
