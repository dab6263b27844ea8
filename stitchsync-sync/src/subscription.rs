//! Cancellation handles for listeners and background tasks.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

type CancelFn = Box<dyn FnOnce() + Send>;

/// Handle returned by every subscription in the engine.
///
/// `cancel` runs the teardown action at most once; later calls are no-ops.
/// Clones share the action, so cancelling any clone cancels all of them.
/// Dropping the handle does not cancel.
#[derive(Clone)]
pub struct Subscription {
    cancel: Arc<Mutex<Option<CancelFn>>>,
}

impl Subscription {
    /// Wraps a teardown action.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Arc::new(Mutex::new(Some(Box::new(cancel)))),
        }
    }

    /// A handle with nothing to tear down.
    pub fn noop() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(None)),
        }
    }

    /// Cancels a spawned task when invoked.
    pub fn for_task<T: Send + 'static>(handle: JoinHandle<T>) -> Self {
        Self::new(move || handle.abort())
    }

    /// Combines two handles; cancelling the result cancels both.
    pub fn join(self, other: Subscription) -> Self {
        Self::new(move || {
            self.cancel();
            other.cancel();
        })
    }

    /// Runs the teardown action if it has not run yet.
    pub fn cancel(&self) {
        let action = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(action) = action {
            action();
        }
    }

    /// Whether `cancel` has been called (always true for `noop`).
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
