//! Deferred teardown of signals and other resources.

use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use tracing::error;

use crate::panic_message;

/// One unit of teardown work.
pub type CleanupTask = Box<dyn FnOnce() + Send>;

/// A registry that runs teardown work when it is itself torn down.
///
/// [`SignalBuilder::janitor()`][crate::SignalBuilder::janitor] registers the signal's
/// [`destroy()`][crate::Signal::destroy] through this trait. Implementations must run each
/// registered task exactly once.
pub trait CleanupRegistry {
    /// Adds a task to run on teardown.
    fn register(&self, task: CleanupTask);
}

/// Collects teardown tasks and runs them together, most recently added first.
///
/// Tasks run on [`cleanup()`][Self::cleanup] or when the janitor is dropped, whichever comes
/// first. A janitor can be reused after `cleanup()`; tasks added later run on the next
/// cleanup.
///
/// ```rust
/// use relay_signal::{Janitor, Signal};
///
/// let janitor = Janitor::new();
/// let signal = Signal::<()>::builder().janitor(&janitor).build();
///
/// drop(janitor);
/// assert!(signal.is_destroyed());
/// ```
#[derive(Default)]
pub struct Janitor {
    tasks: Mutex<Vec<CleanupTask>>,
}

impl Janitor {
    /// Creates an empty janitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task to run on cleanup.
    pub fn add<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.tasks.lock().push(Box::new(task));
    }

    /// Number of tasks waiting for cleanup.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether no tasks are waiting for cleanup.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Runs and forgets every registered task, most recently added first.
    ///
    /// A panicking task is logged and does not stop the others. Tasks may add new tasks;
    /// those run on the next cleanup.
    pub fn cleanup(&self) {
        let tasks = mem::take(&mut *self.tasks.lock());

        for task in tasks.into_iter().rev() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                error!(
                    message = %panic_message(payload.as_ref()),
                    "cleanup task panicked"
                );
            }
        }
    }
}

impl CleanupRegistry for Janitor {
    fn register(&self, task: CleanupTask) {
        self.tasks.lock().push(task);
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl fmt::Debug for Janitor {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Janitor")
            .field("pending", &self.len())
            .finish()
    }
}
