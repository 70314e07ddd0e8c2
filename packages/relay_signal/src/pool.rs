//! Free list of reusable execution contexts for pooled deferred firing.

use std::any::type_name;
use std::sync::{Arc, LazyLock};
use std::{fmt, mem};

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::{ContextSlot, ExecutionContext};

/// How many idle contexts a pool keeps by default before it starts dropping returned ones.
pub const DEFAULT_MAX_IDLE_CONTEXTS: usize = 256;

static GLOBAL_POOL: LazyLock<ExecutionContextPool> = LazyLock::new(ExecutionContextPool::new);

pub(crate) struct PoolInner {
    free: Mutex<Vec<Box<ContextSlot>>>,
    max_idle: usize,
}

impl fmt::Debug for PoolInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("idle", &self.free.lock().len())
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

impl PoolInner {
    /// Takes back a context whose job has returned.
    pub(crate) fn release(&self, slot: Box<ContextSlot>) {
        if !slot.is_reusable() {
            error!(
                context_id = slot.id(),
                state = ?slot.state(),
                "refusing to pool an execution context that is not idle"
            );
            return;
        }

        let mut free = self.free.lock();

        if free.len() < self.max_idle {
            free.push(slot);
        } else {
            trace!(context_id = slot.id(), "pool full, dropping execution context");
        }
    }
}

/// A bounded free list of execution contexts used by
/// [`Signal::fire_deferred_pooled()`][crate::Signal::fire_deferred_pooled].
///
/// Acquiring a context removes it from the free list, so exactly one deferred call holds a
/// given context at a time. The context returns to the free list when its callback returns.
///
/// All signals share the [global pool][Self::global] unless one is supplied through
/// [`SignalBuilder::context_pool()`][crate::SignalBuilder::context_pool]. Clones of a pool
/// share the same free list.
///
/// # Example
///
/// ```rust
/// use relay_signal::{ExecutionContextPool, Signal, scheduler};
///
/// let pool = ExecutionContextPool::builder().max_idle(8).build();
/// let signal = Signal::<u32>::builder().context_pool(pool.clone()).build();
/// signal.connect(|_| {}).unwrap();
///
/// signal.fire_deferred_pooled(1).unwrap();
/// scheduler::run_deferred();
///
/// // The context used for the call is back in the pool, ready for the next fire.
/// assert_eq!(pool.idle_count(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct ExecutionContextPool {
    inner: Arc<PoolInner>,
}

impl ExecutionContextPool {
    /// Creates an empty pool with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring a pool.
    #[must_use]
    pub fn builder() -> ExecutionContextPoolBuilder {
        ExecutionContextPoolBuilder::new()
    }

    /// The process-wide pool used by signals that were not given their own.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL_POOL
    }

    /// Number of idle contexts currently waiting for reuse.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner.free.lock().len()
    }

    /// Maximum number of idle contexts this pool retains.
    #[must_use]
    pub fn max_idle(&self) -> usize {
        self.inner.max_idle
    }

    /// Drops all idle contexts. Contexts currently in use are unaffected and will be
    /// returned to the pool as usual.
    pub fn clear(&self) {
        let idle = mem::take(&mut *self.inner.free.lock());
        drop(idle);
    }

    /// Takes an idle context out of the pool, or creates one if none is available.
    pub(crate) fn acquire(&self) -> ExecutionContext {
        loop {
            let candidate = self.inner.free.lock().pop();

            let Some(slot) = candidate else {
                let context = ExecutionContext::pooled(ContextSlot::new(), Arc::clone(&self.inner));
                trace!(context_id = context.id(), "created pooled execution context");
                return context;
            };

            if slot.is_reusable() {
                trace!(
                    context_id = slot.id(),
                    previous_runs = slot.runs(),
                    "reusing pooled execution context"
                );
                return ExecutionContext::pooled(slot, Arc::clone(&self.inner));
            }

            error!(
                context_id = slot.id(),
                state = ?slot.state(),
                "discarding pooled execution context that was not idle"
            );
        }
    }
}

impl Default for ExecutionContextPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for configuring an [`ExecutionContextPool`].
#[derive(Debug)]
pub struct ExecutionContextPoolBuilder {
    max_idle: usize,
}

impl ExecutionContextPoolBuilder {
    fn new() -> Self {
        Self {
            max_idle: DEFAULT_MAX_IDLE_CONTEXTS,
        }
    }

    /// Sets how many idle contexts the pool keeps. Contexts returned beyond this limit are
    /// dropped.
    ///
    /// Default is [`DEFAULT_MAX_IDLE_CONTEXTS`]. Zero disables retention, which makes pooled
    /// firing behave like fresh-context firing.
    #[must_use]
    pub fn max_idle(mut self, count: usize) -> Self {
        self.max_idle = count;
        self
    }

    /// Builds the pool with the configured settings.
    #[must_use]
    pub fn build(self) -> ExecutionContextPool {
        ExecutionContextPool {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                max_idle: self.max_idle,
            }),
        }
    }
}
