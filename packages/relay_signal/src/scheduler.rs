//! The per-thread run queue that executes deferred callbacks.
//!
//! Deferred fires ([`Signal::fire_deferred()`][crate::Signal::fire_deferred] and friends) do not
//! run any subscriber code on the calling stack. Each call is loaded into an execution context
//! and appended to the run queue of the firing thread. The queue is drained in FIFO order by
//! [`run_deferred()`], or implicitly while the thread is inside [`block_on()`].
//!
//! Jobs queued on one thread are only ever run on that thread. A thread that exits with calls
//! still queued runs them as part of its exit, so every queued call runs exactly once.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::thread::{self, Thread};

use futures::task::{ArcWake, waker};
use tracing::{trace, warn};

use crate::{Error, ExecutionContext};

thread_local! {
    static RUN_QUEUE: RunQueue = const { RunQueue::new() };

    /// How many pooled execution contexts are currently running on this thread.
    static POOLED_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// The deferred calls of one thread.
struct RunQueue {
    contexts: RefCell<VecDeque<ExecutionContext>>,
}

impl RunQueue {
    const fn new() -> Self {
        Self {
            contexts: RefCell::new(VecDeque::new()),
        }
    }

    fn push(&self, context: ExecutionContext) {
        self.contexts.borrow_mut().push_back(context);
    }

    // The borrow must end before the popped context runs, since it may queue more calls.
    fn pop(&self) -> Option<ExecutionContext> {
        self.contexts.borrow_mut().pop_front()
    }

    fn len(&self) -> usize {
        self.contexts.borrow().len()
    }
}

impl Drop for RunQueue {
    fn drop(&mut self) {
        let mut leftover: usize = 0;

        // Calls queued by these runs can no longer reach this queue; `defer()` runs them
        // inline instead.
        while let Some(context) = self.contexts.get_mut().pop_front() {
            context.run();
            leftover = leftover.wrapping_add(1);
        }

        if leftover > 0 {
            warn!(
                leftover,
                "thread exited without draining its deferred calls, ran them during exit"
            );
        }
    }
}

/// Appends a loaded context to the current thread's run queue.
///
/// Once the thread has started tearing down its queue, the context runs immediately instead.
pub(crate) fn defer(context: ExecutionContext) {
    trace!(
        context_id = context.id(),
        pooled = context.is_pooled(),
        "deferred call queued"
    );

    let mut context = Some(context);

    // Only fails while the thread is exiting.
    let queued = RUN_QUEUE.try_with(|queue| {
        if let Some(context) = context.take() {
            queue.push(context);
        }
    });

    if let (Err(_), Some(context)) = (queued, context.take()) {
        context.run();
    }
}

/// Number of deferred calls queued on the current thread that have not run yet.
#[must_use]
pub fn pending_deferred() -> usize {
    RUN_QUEUE.try_with(RunQueue::len).unwrap_or(0)
}

/// Runs deferred calls queued on the current thread until the queue is empty.
///
/// Calls queued by the callbacks being run are picked up in the same drain. Returns how many
/// calls were executed.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// use relay_signal::{Signal, scheduler};
///
/// let signal = Signal::<u32>::new();
/// let total = Arc::new(AtomicU32::new(0));
///
/// signal
///     .connect({
///         let total = Arc::clone(&total);
///         move |value| {
///             total.fetch_add(*value, Ordering::Relaxed);
///         }
///     })
///     .unwrap();
///
/// signal.fire_deferred(5).unwrap();
/// assert_eq!(total.load(Ordering::Relaxed), 0);
///
/// assert_eq!(scheduler::run_deferred(), 1);
/// assert_eq!(total.load(Ordering::Relaxed), 5);
/// ```
pub fn run_deferred() -> usize {
    let mut executed: usize = 0;

    while let Some(context) = RUN_QUEUE.try_with(RunQueue::pop).ok().flatten() {
        context.run();
        executed = executed.wrapping_add(1);
    }

    if executed > 0 {
        trace!(executed, "drained deferred calls");
    }

    executed
}

/// Drives a future to completion on the current thread, running deferred calls while it waits.
///
/// This is the way to consume a [`Wait`][crate::Wait] from synchronous code. The thread parks
/// whenever the future is pending and the run queue is empty; wakes from other threads unpark
/// it.
///
/// # Errors
///
/// Returns [`Error::UnsafeReentrantPoolUse`] without polling the future if called from a
/// callback that runs on a pooled execution context. Such a context must return to its pool
/// when the callback finishes and cannot be held across a suspension.
///
/// # Example
///
/// ```rust
/// use relay_signal::{Signal, scheduler};
///
/// let signal = Signal::<String>::new();
/// let wait = signal.wait();
///
/// signal.fire_deferred("ready".to_string()).unwrap();
///
/// let value = scheduler::block_on(wait).unwrap().unwrap();
/// assert_eq!(value, "ready");
/// ```
pub fn block_on<F: Future>(future: F) -> Result<F::Output, Error> {
    if in_pooled_context() {
        return Err(Error::UnsafeReentrantPoolUse);
    }

    let wake = Arc::new(ThreadWake::new(thread::current()));
    let task_waker = waker(Arc::clone(&wake));
    let mut cx = Context::from_waker(&task_waker);
    let mut future = pin!(future);

    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return Ok(output);
        }

        if run_deferred() > 0 {
            continue;
        }

        wake.park_until_notified();
    }
}

/// Whether the current thread is inside a callback running on a pooled execution context.
#[must_use]
pub fn in_pooled_context() -> bool {
    POOLED_DEPTH.get() > 0
}

/// Marks the current thread as running a pooled execution context for as long as it lives.
#[derive(Debug)]
pub(crate) struct PooledRunGuard {
    _private: (),
}

impl PooledRunGuard {
    pub(crate) fn enter() -> Self {
        POOLED_DEPTH.set(POOLED_DEPTH.get().wrapping_add(1));
        Self { _private: () }
    }
}

impl Drop for PooledRunGuard {
    fn drop(&mut self) {
        POOLED_DEPTH.set(POOLED_DEPTH.get().saturating_sub(1));
    }
}

/// Unparks the blocked thread when the future it is driving is woken.
#[derive(Debug)]
struct ThreadWake {
    thread: Thread,
    notified: AtomicBool,
}

impl ThreadWake {
    fn new(thread: Thread) -> Self {
        Self {
            thread,
            notified: AtomicBool::new(false),
        }
    }

    fn park_until_notified(&self) {
        while !self.notified.swap(false, Ordering::AcqRel) {
            thread::park();
        }
    }
}

impl ArcWake for ThreadWake {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.notified.store(true, Ordering::Release);
        arc_self.thread.unpark();
    }
}
