//! Execution contexts that carry deferred callbacks through the run queue.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::error;

use crate::{PoolInner, PooledRunGuard, panic_message};

/// A deferred unit of work.
pub(crate) type Job = Box<dyn FnOnce() + Send>;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ContextState {
    /// Ready to accept a job. The only state in which a context may sit in a pool.
    Idle,

    /// Holds a job and is waiting in a run queue.
    Loaded,

    /// Currently executing its job.
    Running,
}

/// The recyclable part of an execution context.
pub(crate) struct ContextSlot {
    id: u64,
    state: ContextState,
    job: Option<Job>,
    runs: u64,
}

impl ContextSlot {
    pub(crate) fn new() -> Box<Self> {
        Box::new(Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            state: ContextState::Idle,
            job: None,
            runs: 0,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn state(&self) -> ContextState {
        self.state
    }

    /// How many jobs this slot has completed over its lifetime.
    pub(crate) fn runs(&self) -> u64 {
        self.runs
    }

    /// Whether the slot can be handed out for a new job.
    pub(crate) fn is_reusable(&self) -> bool {
        self.state == ContextState::Idle && self.job.is_none()
    }
}

impl fmt::Debug for ContextSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSlot")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("has_job", &self.job.is_some())
            .field("runs", &self.runs)
            .finish()
    }
}

/// A suspended context that runs one deferred callback when the run queue reaches it.
///
/// Contexts either come from an [`ExecutionContextPool`][crate::ExecutionContextPool] and go
/// back to it after their job returns, or are created for a single job and dropped afterwards.
pub(crate) struct ExecutionContext {
    slot: Box<ContextSlot>,

    /// The pool to return to after running, if this context is pooled.
    home: Option<Arc<PoolInner>>,
}

impl ExecutionContext {
    /// Creates a single-use context that is not returned anywhere after running.
    pub(crate) fn fresh() -> Self {
        Self {
            slot: ContextSlot::new(),
            home: None,
        }
    }

    pub(crate) fn pooled(slot: Box<ContextSlot>, home: Arc<PoolInner>) -> Self {
        debug_assert!(slot.is_reusable());

        Self {
            slot,
            home: Some(home),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.slot.id()
    }

    pub(crate) fn is_pooled(&self) -> bool {
        self.home.is_some()
    }

    pub(crate) fn load(&mut self, job: Job) {
        debug_assert!(self.slot.is_reusable());

        self.slot.job = Some(job);
        self.slot.state = ContextState::Loaded;
    }

    /// Runs the loaded job and then returns the context to its pool, if it has one.
    ///
    /// A panicking job is logged and otherwise swallowed; the context is still recycled.
    pub(crate) fn run(mut self) {
        if let Some(job) = self.slot.job.take() {
            self.slot.state = ContextState::Running;

            let outcome = {
                let _pooled = self.is_pooled().then(PooledRunGuard::enter);
                panic::catch_unwind(AssertUnwindSafe(job))
            };

            if let Err(payload) = outcome {
                error!(
                    context_id = self.slot.id(),
                    pooled = self.is_pooled(),
                    message = %panic_message(payload.as_ref()),
                    "deferred callback panicked"
                );
            }

            self.slot.runs = self.slot.runs.wrapping_add(1);
        }

        self.slot.state = ContextState::Idle;

        if let Some(home) = self.home {
            home.release(self.slot);
        }
    }

    #[cfg(test)]
    pub(crate) fn into_parts(self) -> (Box<ContextSlot>, Arc<PoolInner>) {
        (
            self.slot,
            self.home.expect("only pooled contexts can be split into parts"),
        )
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("slot", &self.slot)
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn fresh_contexts_have_distinct_ids() {
        let a = ExecutionContext::fresh();
        let b = ExecutionContext::fresh();

        assert_ne!(a.id(), b.id());
        assert!(!a.is_pooled());
    }

    #[test]
    fn run_executes_loaded_job_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut context = ExecutionContext::fresh();

        context.load(Box::new({
            let calls = Arc::clone(&calls);
            move || {
                calls.fetch_add(1, Ordering::Relaxed);
            }
        }));
        context.run();

        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn run_without_job_is_harmless() {
        ExecutionContext::fresh().run();
    }

    #[test]
    fn panicking_job_is_contained() {
        let mut context = ExecutionContext::fresh();
        context.load(Box::new(|| panic!("deferred failure")));

        context.run();
    }

    #[test]
    fn new_slot_is_reusable() {
        let slot = ContextSlot::new();

        assert!(slot.is_reusable());
        assert_eq!(slot.state(), ContextState::Idle);
        assert_eq!(slot.runs(), 0);
    }
}
