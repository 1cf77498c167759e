//! Runtime abstraction layer for async operations
//!
//! The viewer never blocks its frame on I/O. Tile loads, preheat calls and
//! annotation persistence are handed to an [`AsyncSpawner`] and report back
//! over channels that the render timeline drains. Each viewer receives its
//! spawner explicitly, so several viewers can share or isolate runtimes.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// A trait for spawning fire-and-forget async tasks (object-safe)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a boxed future; completion is reported by the future itself
    fn spawn_boxed(&self, future: BoxFuture<'static, ()>);
}

/// Shared handle to a spawner
pub type SharedSpawner = Arc<dyn AsyncSpawner>;

/// Convenience wrapper for spawning with type safety
pub fn spawn<F>(spawner: &dyn AsyncSpawner, future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    spawner.spawn_boxed(Box::pin(future));
}

/// Drives every future to completion on the calling thread.
///
/// Useful for headless tools and deterministic tests: results are already
/// waiting in the channels by the time `spawn_boxed` returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineSpawner;

impl AsyncSpawner for InlineSpawner {
    fn spawn_boxed(&self, future: BoxFuture<'static, ()>) {
        futures::executor::block_on(future);
    }
}

#[cfg(feature = "tokio-runtime")]
pub mod tokio_impl {
    use super::*;
    use crate::{Error, Result};
    use tokio::runtime::Handle;

    /// Tokio-based async spawner bound to a runtime handle
    #[derive(Debug, Clone)]
    pub struct TokioSpawner {
        handle: Handle,
    }

    impl TokioSpawner {
        pub fn new(handle: Handle) -> Self {
            Self { handle }
        }

        /// Bind to the runtime the caller is currently running inside
        pub fn current() -> Result<Self> {
            Handle::try_current()
                .map(Self::new)
                .map_err(|e| Error::Runtime(format!("no tokio runtime available: {e}")))
        }
    }

    impl AsyncSpawner for TokioSpawner {
        fn spawn_boxed(&self, future: BoxFuture<'static, ()>) {
            // Dropping the JoinHandle detaches the task; it still runs to completion
            drop(self.handle.spawn(future));
        }
    }
}

#[cfg(feature = "tokio-runtime")]
pub use tokio_impl::TokioSpawner;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_inline_spawner_runs_to_completion() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        spawn(&InlineSpawner, async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
