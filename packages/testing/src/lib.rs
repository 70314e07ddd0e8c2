#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples in relay_signal packages.

use std::pin::Pin;
use std::sync::{Arc, mpsc};
use std::task::{Context, Poll};
use std::time::Duration;
use std::{env, fmt, mem, panic, thread};

use futures::task::noop_waker_ref;
use parking_lot::Mutex;

/// Runs `test_fn` on a separate thread and fails the test if it does not finish in time.
///
/// Anything that parks a thread on a signal (a blocking wait, a drain that never empties) can
/// hang a test forever if the code under test is wrong. Wrapping such tests turns the hang
/// into a failure after 10 seconds, or 60 seconds under Miri.
///
/// If the `MUTATION_TESTING` environment variable is `1`, the closure runs directly on the
/// calling thread without a timeout, so that mutation testing can observe real hangs.
///
/// Deferred calls are queued per thread. The closure therefore sees an empty run queue,
/// regardless of what the calling thread had queued.
///
/// # Panics
///
/// Panics if the timeout expires. A panic inside `test_fn` is resumed on the calling thread.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // The receiver is gone if the watchdog already fired.
        drop(tx.send(result));
    });

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("test thread should not panic after sending its result");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded {timeout:?} timeout");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("test thread exited without a result"),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}

/// Polls `future` once with a waker that does nothing.
///
/// Useful for asserting that a wait is still pending, or that it resolved without the
/// scheduler having to run.
pub fn poll_once<F>(future: &mut F) -> Poll<F::Output>
where
    F: Future + Unpin,
{
    let mut cx = Context::from_waker(noop_waker_ref());
    Pin::new(future).poll(&mut cx)
}

/// Collects values handed to subscriber callbacks, in the order they arrive.
///
/// Clones share the same storage.
///
/// ```rust
/// use testing::Recorder;
///
/// let recorder = Recorder::<i32>::new();
/// let callback = recorder.sink();
///
/// callback(&1);
/// callback(&2);
///
/// assert_eq!(recorder.take(), [1, 2]);
/// ```
pub struct Recorder<T> {
    values: Arc<Mutex<Vec<T>>>,
}

impl<T> Recorder<T>
where
    T: Clone + Send + 'static,
{
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A callback that records a clone of every value it receives.
    #[must_use]
    pub fn sink(&self) -> impl Fn(&T) + Send + Sync + 'static {
        let values = Arc::clone(&self.values);
        move |value: &T| values.lock().push(value.clone())
    }

    /// A callback that records every value it receives after passing it through `map`.
    #[must_use]
    pub fn sink_with<A, M>(&self, map: M) -> impl Fn(&A) + Send + Sync + 'static
    where
        M: Fn(&A) -> T + Send + Sync + 'static,
    {
        let values = Arc::clone(&self.values);
        move |value: &A| values.lock().push(map(value))
    }

    /// Number of values recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    /// A copy of everything recorded so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.values.lock().clone()
    }

    /// Removes and returns everything recorded so far.
    #[must_use]
    pub fn take(&self) -> Vec<T> {
        mem::take(&mut *self.values.lock())
    }
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            values: Arc::clone(&self.values),
        }
    }
}

impl<T> Default for Recorder<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Recorder<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("values", &*self.values.lock())
            .finish()
    }
}
