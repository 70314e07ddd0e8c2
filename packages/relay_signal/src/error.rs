use std::any::Any;

use thiserror::Error;

/// Failures reported by [`Signal`][crate::Signal] operations and by the deferred scheduler.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The signal has been destroyed and no longer accepts subscribers, fires or waits.
    #[error("the signal has been destroyed")]
    Destroyed,

    /// A pending [`Signal::wait()`][crate::Signal::wait] was cut short because its connection
    /// was dropped by [`Signal::disconnect_all()`][crate::Signal::disconnect_all] or
    /// [`Signal::destroy()`][crate::Signal::destroy] before any fire reached it.
    #[error("the signal was disconnected while a wait was pending")]
    WaitAbandoned,

    /// A callback running on a pooled execution context tried to block on the scheduler.
    ///
    /// Pooled contexts must return to the pool as soon as their callback finishes, so blocking
    /// inside one is rejected instead of stranding the context.
    #[error("a callback running on a pooled execution context tried to block on the scheduler")]
    UnsafeReentrantPoolUse,

    /// One or more subscriber callbacks panicked during a synchronous fire.
    ///
    /// The remaining subscribers still ran.
    #[error("{failures} subscriber callback(s) panicked during fire, first panic: {message}")]
    CallbackPanicked {
        /// How many callbacks panicked.
        failures: usize,

        /// The message carried by the first panic.
        message: String,
    },
}

/// Formats a panic payload for logging and error reporting.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
