//! In-process signals: broadcast values to any number of subscribers, immediately or deferred.
//!
//! A [`Signal<A>`] holds a list of subscribers and hands each fired value to every one of them
//! by reference. Subscribers run in reverse connection order (most recent first).
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! use relay_signal::{Signal, scheduler};
//!
//! let signal = Signal::<u32>::new();
//! let total = Arc::new(AtomicU32::new(0));
//!
//! let connection = signal
//!     .connect({
//!         let total = Arc::clone(&total);
//!         move |value| {
//!             total.fetch_add(*value, Ordering::Relaxed);
//!         }
//!     })
//!     .unwrap();
//!
//! // Immediate: runs every subscriber before returning.
//! signal.fire(&1).unwrap();
//! assert_eq!(total.load(Ordering::Relaxed), 1);
//!
//! // Deferred: queued on this thread until the queue is drained.
//! signal.fire_deferred(10).unwrap();
//! assert_eq!(total.load(Ordering::Relaxed), 1);
//! scheduler::run_deferred();
//! assert_eq!(total.load(Ordering::Relaxed), 11);
//!
//! connection.disconnect();
//! signal.fire(&100).unwrap();
//! assert_eq!(total.load(Ordering::Relaxed), 11);
//! ```
//!
//! # Firing disciplines
//!
//! - [`Signal::fire()`] calls subscribers synchronously. Fires may nest.
//! - [`Signal::fire_deferred()`] queues the calls on the current thread's run queue, one fresh
//!   execution context per subscriber. They run when the thread calls
//!   [`scheduler::run_deferred()`] or blocks in [`scheduler::block_on()`].
//! - [`Signal::fire_deferred_pooled()`] does the same with contexts recycled through an
//!   [`ExecutionContextPool`]. Subscribers called this way must not block on the scheduler.
//! - [`Signal::fire_bindable()`] and [`Signal::fire_bindable_pooled()`] choose between the
//!   immediate and deferred paths using the process-wide [`capability`] flag.
//!
//! # Waiting
//!
//! [`Signal::wait()`] returns a future for the next fired value. It can be awaited or driven
//! from synchronous code with [`Wait::block()`].
//!
//! # Lifecycle
//!
//! [`Signal::destroy()`] disconnects everything, resolves pending waits with
//! [`Error::WaitAbandoned`] and makes every later subscribe, fire and wait fail with
//! [`Error::Destroyed`]. A [`Janitor`] can call it on the owner's behalf.
//!
//! # Native event sources
//!
//! [`Signal::wrap()`] turns any [`NativeEvent`] into a signal that re-fires whatever the source
//! delivers.

mod connection;
mod context;
mod error;
mod janitor;
mod native;
mod pool;
mod registry;
mod signal;
mod wait;

pub mod capability;
pub mod scheduler;

pub use connection::Connection;
pub(crate) use connection::{Handler, Node, Resume};
pub(crate) use context::*;
pub use error::Error;
pub(crate) use error::panic_message;
pub use janitor::*;
pub use native::*;
pub(crate) use pool::PoolInner;
pub use pool::{DEFAULT_MAX_IDLE_CONTEXTS, ExecutionContextPool, ExecutionContextPoolBuilder};
pub(crate) use registry::*;
pub(crate) use scheduler::PooledRunGuard;
pub(crate) use signal::SignalCore;
pub use signal::{Signal, SignalBuilder};
pub use wait::Wait;
