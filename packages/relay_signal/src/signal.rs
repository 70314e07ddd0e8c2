//! The signal type and its dispatch engine.

use std::any::{Any, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::{
    Chain, CleanupRegistry, Connection, ConnectionRegistry, Error, ExecutionContext,
    ExecutionContextPool, Handler, Node, Resume, Wait, capability, panic_message, scheduler,
};

/// Releases an external native subscription.
pub(crate) type Unsubscribe = Box<dyn FnOnce() + Send>;

pub(crate) struct SignalCore<A> {
    pub(crate) registry: ConnectionRegistry<A>,

    /// Monotonic. Set before the connection list is swept.
    destroyed: AtomicBool,

    debug_mode: bool,
    name: Option<String>,

    /// Where `fire_deferred_pooled()` takes its execution contexts from.
    pool: ExecutionContextPool,

    /// Present only for wrapped signals until they are destroyed.
    pub(crate) native: Mutex<Option<Unsubscribe>>,
}

impl<A> SignalCore<A> {
    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn ensure_alive(&self) -> Result<(), Error> {
        if self.is_destroyed() {
            Err(Error::Destroyed)
        } else {
            Ok(())
        }
    }

    fn release_native(&self) {
        let unsubscribe = self.native.lock().take();

        if let Some(unsubscribe) = unsubscribe {
            unsubscribe();
            debug!(signal = self.name(), "released native subscription");
        }
    }
}

impl<A> Drop for SignalCore<A> {
    fn drop(&mut self) {
        // A wrapped signal dropped without destroy() must not stay subscribed to its source.
        if let Some(unsubscribe) = self.native.get_mut().take() {
            unsubscribe();
        }
    }
}

impl<A> fmt::Debug for SignalCore<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("name", &self.name)
            .field("destroyed", &self.is_destroyed())
            .field("debug_mode", &self.debug_mode)
            .field("wrapped", &self.native.lock().is_some())
            .finish_non_exhaustive()
    }
}

/// A broadcast point that delivers values of type `A` to any number of subscribers.
///
/// Subscribers are added with [`connect()`][Self::connect] or [`once()`][Self::once] and
/// receive every value passed to one of the fire methods:
///
/// * [`fire()`][Self::fire] calls every subscriber synchronously before returning.
/// * [`fire_deferred()`][Self::fire_deferred] queues one call per subscriber on the current
///   thread's run queue (see [`scheduler`]).
/// * [`fire_deferred_pooled()`][Self::fire_deferred_pooled] does the same with recycled
///   execution contexts.
/// * [`fire_bindable()`][Self::fire_bindable] picks between the immediate and deferred paths
///   based on the process-wide [capability flag][capability::deferred_events].
///
/// Subscribers run in reverse connection order: the most recently connected runs first.
///
/// `Signal` is a cheap handle; clones share the same subscribers. Dropping the last handle does
/// not destroy the signal, so connections handed out earlier stay valid until disconnected.
///
/// # Example
///
/// ```rust
/// use std::sync::{Arc, Mutex};
///
/// use relay_signal::Signal;
///
/// let signal = Signal::<(u32, &'static str)>::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// signal
///     .connect({
///         let seen = Arc::clone(&seen);
///         move |(number, text)| seen.lock().unwrap().push(format!("{number} {text}"))
///     })
///     .unwrap();
///
/// signal.fire(&(42, "x")).unwrap();
///
/// assert_eq!(*seen.lock().unwrap(), ["42 x"]);
/// ```
pub struct Signal<A> {
    core: Arc<SignalCore<A>>,
}

impl<A> Signal<A>
where
    A: Send + Sync + 'static,
{
    /// Creates a signal with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring a signal.
    #[must_use]
    pub fn builder<'a>() -> SignalBuilder<'a, A> {
        SignalBuilder::new()
    }

    pub(crate) fn from_core(core: Arc<SignalCore<A>>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &Arc<SignalCore<A>> {
        &self.core
    }

    /// Subscribes `callback` to every subsequent fire.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Destroyed`] if the signal has been destroyed.
    pub fn connect<F>(&self, callback: F) -> Result<Connection<A>, Error>
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.attach(Handler::callback(callback), false)
    }

    /// Subscribes `callback` to the next fire only.
    ///
    /// The connection is disconnected before the callback is invoked, so the callback runs at
    /// most once even if it fires the same signal again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Destroyed`] if the signal has been destroyed.
    pub fn once<F>(&self, callback: F) -> Result<Connection<A>, Error>
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.attach(Handler::callback(callback), true)
    }

    /// Older name of [`once()`][Self::once].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Destroyed`] if the signal has been destroyed.
    #[deprecated(since = "0.1.0", note = "use `once()` instead")]
    pub fn connect_once<F>(&self, callback: F) -> Result<Connection<A>, Error>
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.once(callback)
    }

    fn attach(&self, handler: Handler<A>, once: bool) -> Result<Connection<A>, Error> {
        self.core.ensure_alive()?;

        let node = Arc::new(Node::new(handler, once, Arc::downgrade(&self.core)));
        self.core.registry.prepend(Arc::clone(&node));

        // A destroy() that raced with us may have swept the list just before the prepend.
        if self.core.is_destroyed() {
            node.disconnect();
            return Err(Error::Destroyed);
        }

        trace!(signal = self.core.name(), once, "connected");

        Ok(Connection::new(node))
    }

    /// Disconnects `connection` if it belongs to this signal.
    ///
    /// Returns `true` if this call disconnected it, `false` if it was already disconnected or
    /// belongs to a different signal.
    pub fn disconnect(&self, connection: &Connection<A>) -> bool {
        let node = connection.node();

        if !node.is_owned_by(&self.core) {
            return false;
        }

        let disconnected = node.disconnect();

        if disconnected {
            trace!(signal = self.core.name(), "disconnected");
        }

        disconnected
    }

    /// Disconnects every subscriber, including pending [`wait()`][Self::wait] calls.
    ///
    /// Pending waits resolve to [`Error::WaitAbandoned`]. A fire that is currently running
    /// invokes no further subscribers once this returns.
    pub fn disconnect_all(&self) {
        let detached = self.core.registry.take_all();

        let mut released: usize = 0;
        let mut abandoned_waits: usize = 0;

        for node in Chain::new(detached) {
            let waiting = node.is_pending_wait();

            if node.release() {
                released = released.wrapping_add(1);

                if waiting {
                    abandoned_waits = abandoned_waits.wrapping_add(1);
                }
            }
        }

        if abandoned_waits > 0 && self.core.debug_mode {
            warn!(
                signal = self.core.name(),
                abandoned_waits, "disconnect_all() interrupted pending wait() calls"
            );
        }

        trace!(signal = self.core.name(), released, "disconnected all");
    }

    /// Handles to every connected subscriber, most recently connected first.
    #[must_use]
    pub fn connections(&self) -> Vec<Connection<A>> {
        self.core
            .registry
            .iter()
            .filter(|node| node.is_connected())
            .map(Connection::new)
            .collect()
    }

    /// Number of connected subscribers.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.core
            .registry
            .iter()
            .filter(|node| node.is_connected())
            .count()
    }

    /// Whether the signal has any subscribers.
    #[must_use]
    pub fn is_connected_to(&self) -> bool {
        !self.core.registry.is_empty()
    }

    /// Calls every connected subscriber with `args`, in order, before returning.
    ///
    /// Subscribers receive the same reference; nothing is copied. A subscriber that connects
    /// during the fire is not called by it, and one that is disconnected during the fire is not
    /// called once the fire reaches it.
    ///
    /// Fires may nest: a subscriber may fire this signal again, and the nested fire finishes
    /// before the outer one moves on. Nothing guards against unbounded recursion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Destroyed`] if the signal has been destroyed, without calling anyone.
    ///
    /// Returns [`Error::CallbackPanicked`] if any subscriber panicked. The panic does not stop
    /// the remaining subscribers from being called.
    pub fn fire(&self, args: &A) -> Result<(), Error> {
        self.core.ensure_alive()?;

        trace!(signal = self.core.name(), "fire");

        let mut failures: usize = 0;
        let mut first_message = None;

        for node in self.core.registry.iter() {
            if !node.claim() {
                continue;
            }

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| node.invoke(args))) {
                let message = panic_message(payload.as_ref());

                error!(
                    signal = self.core.name(),
                    message = %message,
                    "subscriber callback panicked"
                );

                failures = failures.wrapping_add(1);
                first_message.get_or_insert(message);
            }
        }

        match first_message {
            None => Ok(()),
            Some(message) => Err(Error::CallbackPanicked { failures, message }),
        }
    }

    /// Queues one call per connected subscriber on the current thread's run queue.
    ///
    /// No subscriber runs before this returns. The queued calls run when the thread next
    /// drains its queue via [`scheduler::run_deferred()`] or [`scheduler::block_on()`]. The set
    /// of subscribers is fixed at the moment of this call; a subscriber disconnected before
    /// its queued call runs is skipped.
    ///
    /// If the thread exits before draining its queue, the queued calls run during thread exit
    /// and a warning is logged.
    ///
    /// `args` is moved into shared storage that all queued calls read from.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Destroyed`] if the signal has been destroyed.
    pub fn fire_deferred(&self, args: A) -> Result<(), Error> {
        self.schedule(args, Placement::Fresh)
    }

    /// Like [`fire_deferred()`][Self::fire_deferred], but runs each call on an execution
    /// context recycled from an [`ExecutionContextPool`].
    ///
    /// # Usage contract
    ///
    /// A subscriber invoked this way must not block on the scheduler. Its context has to go
    /// back to the pool as soon as it returns. Calling [`scheduler::block_on()`] (including
    /// [`Wait::block()`]) from such a subscriber fails with
    /// [`Error::UnsafeReentrantPoolUse`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Destroyed`] if the signal has been destroyed.
    pub fn fire_deferred_pooled(&self, args: A) -> Result<(), Error> {
        self.schedule(args, Placement::Pooled)
    }

    /// Fires immediately or deferred, following the process-wide
    /// [event mode][capability::deferred_events].
    ///
    /// # Errors
    ///
    /// As [`fire()`][Self::fire] or [`fire_deferred()`][Self::fire_deferred], whichever path
    /// was taken.
    pub fn fire_bindable(&self, args: A) -> Result<(), Error> {
        if capability::deferred_events() {
            self.fire_deferred(args)
        } else {
            self.fire(&args)
        }
    }

    /// Fires immediately or deferred on pooled contexts, following the process-wide
    /// [event mode][capability::deferred_events].
    ///
    /// The [usage contract](Self::fire_deferred_pooled#usage-contract) of pooled firing
    /// applies when the deferred path is taken.
    ///
    /// # Errors
    ///
    /// As [`fire()`][Self::fire] or [`fire_deferred_pooled()`][Self::fire_deferred_pooled],
    /// whichever path was taken.
    pub fn fire_bindable_pooled(&self, args: A) -> Result<(), Error> {
        if capability::deferred_events() {
            self.fire_deferred_pooled(args)
        } else {
            self.fire(&args)
        }
    }

    fn schedule(&self, args: A, placement: Placement) -> Result<(), Error> {
        self.core.ensure_alive()?;

        let args = Arc::new(args);
        let mut scheduled: usize = 0;

        for node in self.core.registry.iter().filter(|node| node.is_connected()) {
            let mut context = match placement {
                Placement::Fresh => ExecutionContext::fresh(),
                Placement::Pooled => self.core.pool.acquire(),
            };

            let args = Arc::clone(&args);

            context.load(Box::new(move || {
                if node.claim() {
                    node.invoke(&args);
                }
            }));

            scheduler::defer(context);
            scheduled = scheduled.wrapping_add(1);
        }

        trace!(
            signal = self.core.name(),
            scheduled,
            placement = ?placement,
            "fire deferred"
        );

        Ok(())
    }

    /// Destroys the signal.
    ///
    /// Every subscriber is disconnected, pending waits resolve to [`Error::WaitAbandoned`] and
    /// a wrapped signal unsubscribes from its native source. Afterwards the signal rejects new
    /// subscribers, fires and waits with [`Error::Destroyed`].
    ///
    /// Idempotent.
    pub fn destroy(&self) {
        if self.core.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.disconnect_all();
        self.core.release_native();

        debug!(signal = self.core.name(), "signal destroyed");
    }

    /// Whether [`destroy()`][Self::destroy] has been called.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.core.is_destroyed()
    }

    /// The name given to the signal at construction, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.core.name()
    }

    /// Whether `value` is a `Signal<A>`.
    ///
    /// The check is per argument type. `Any` identifies concrete types only, so a signal
    /// carrying a different argument type is not recognized: ask with the `A` you expect.
    ///
    /// ```rust
    /// use std::any::Any;
    ///
    /// use relay_signal::Signal;
    ///
    /// let signal = Signal::<u8>::new();
    /// let unknown: &dyn Any = &signal;
    ///
    /// assert!(Signal::<u8>::is(unknown));
    /// assert!(!Signal::<u8>::is(&"not a signal"));
    /// assert!(!Signal::<u8>::is(&Signal::<u16>::new()));
    /// ```
    #[must_use]
    pub fn is(value: &dyn Any) -> bool {
        value.is::<Self>()
    }

    /// Narrows `value` to a `Signal<A>` if it is one.
    #[must_use]
    pub fn downcast_ref(value: &dyn Any) -> Option<&Self> {
        value.downcast_ref::<Self>()
    }

    pub(crate) fn register_with(&self, janitor: Option<&dyn CleanupRegistry>) {
        let Some(janitor) = janitor else {
            return;
        };

        let signal = self.clone();
        janitor.register(Box::new(move || signal.destroy()));
    }
}

impl<A> Signal<A>
where
    A: Clone + Send + Sync + 'static,
{
    /// Returns a future that resolves with the arguments of the next fire.
    ///
    /// The wait subscribes immediately, so a fire that happens after this call and before the
    /// first poll is still observed. Each waiter receives its own clone of the fired value.
    ///
    /// The future resolves to [`Error::WaitAbandoned`] if the signal is destroyed or
    /// [`disconnect_all()`][Self::disconnect_all] is called first, and to
    /// [`Error::Destroyed`] if the signal was already destroyed. Dropping the future
    /// disconnects the wait.
    ///
    /// ```rust
    /// use relay_signal::Signal;
    ///
    /// let signal = Signal::<(u32, String)>::new();
    /// let wait = signal.wait();
    ///
    /// signal.fire(&(42, "x".to_string())).unwrap();
    ///
    /// assert_eq!(wait.block(), Ok((42, "x".to_string())));
    /// ```
    pub fn wait(&self) -> Wait<A> {
        let (sender, receiver) = oneshot::channel();

        let resume: Resume<A> = Box::new(move |args: &A| {
            if sender.send(args.clone()).is_err() {
                trace!("waiter was gone before the fire reached it");
            }
        });

        match self.attach(Handler::resume(resume), true) {
            Ok(connection) => Wait::pending(connection, receiver),
            Err(error) => Wait::failed(error),
        }
    }
}

impl<A> Clone for Signal<A> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("core", &self.core)
            .finish()
    }
}

impl<A> Default for Signal<A>
where
    A: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug)]
enum Placement {
    Fresh,
    Pooled,
}

/// Builder for configuring a [`Signal`].
///
/// ```rust
/// use relay_signal::{Janitor, Signal};
///
/// let janitor = Janitor::new();
/// let signal = Signal::<u32>::builder()
///     .name("temperature")
///     .debug_mode(true)
///     .janitor(&janitor)
///     .build();
///
/// janitor.cleanup();
/// assert!(signal.is_destroyed());
/// ```
#[must_use]
pub struct SignalBuilder<'a, A> {
    name: Option<String>,
    debug_mode: bool,
    janitor: Option<&'a dyn CleanupRegistry>,
    pool: Option<ExecutionContextPool>,

    _args: PhantomData<fn(&A)>,
}

impl<'a, A> SignalBuilder<'a, A>
where
    A: Send + Sync + 'static,
{
    fn new() -> Self {
        Self {
            name: None,
            debug_mode: false,
            janitor: None,
            pool: None,
            _args: PhantomData,
        }
    }

    /// Sets a name recorded on the signal's log events.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enables diagnostics, such as a warning when a pending wait is interrupted by
    /// [`Signal::disconnect_all()`].
    ///
    /// Default is `false`.
    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }

    /// Registers the signal with a cleanup registry, which destroys it on teardown.
    pub fn janitor(mut self, janitor: &'a dyn CleanupRegistry) -> Self {
        self.janitor = Some(janitor);
        self
    }

    /// Uses `pool` for [`Signal::fire_deferred_pooled()`] instead of the
    /// [global pool][ExecutionContextPool::global].
    pub fn context_pool(mut self, pool: ExecutionContextPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Builds the signal.
    #[must_use]
    pub fn build(self) -> Signal<A> {
        let (signal, janitor) = self.into_parts();
        signal.register_with(janitor);
        signal
    }

    /// Splits into a not-yet-registered signal and the registry it should be registered with.
    pub(crate) fn into_parts(self) -> (Signal<A>, Option<&'a dyn CleanupRegistry>) {
        let core = SignalCore {
            registry: ConnectionRegistry::new(),
            destroyed: AtomicBool::new(false),
            debug_mode: self.debug_mode,
            name: self.name,
            pool: self
                .pool
                .unwrap_or_else(|| ExecutionContextPool::global().clone()),
            native: Mutex::new(None),
        };

        (Signal::from_core(Arc::new(core)), self.janitor)
    }
}

impl<A> fmt::Debug for SignalBuilder<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("name", &self.name)
            .field("debug_mode", &self.debug_mode)
            .field("janitor", &self.janitor.is_some())
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    use static_assertions::assert_impl_all;
    use testing::with_watchdog;

    use super::*;

    assert_impl_all!(Signal<u32>: Send, Sync, Clone, Default);
    assert_impl_all!(Signal<String>: Send, Sync);

    fn recorder(
        signal: &Signal<u32>,
        label: &'static str,
        log: &Arc<Mutex<Vec<(&'static str, u32)>>>,
    ) {
        let log = Arc::clone(log);
        signal
            .connect(move |value| log.lock().push((label, *value)))
            .unwrap();
    }

    #[test]
    fn fire_runs_subscribers_newest_first() {
        let signal = Signal::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        recorder(&signal, "a", &log);
        recorder(&signal, "b", &log);
        recorder(&signal, "c", &log);

        signal.fire(&5).unwrap();

        assert_eq!(*log.lock(), [("c", 5), ("b", 5), ("a", 5)]);
    }

    #[test]
    fn subscriber_connected_during_fire_is_not_called_by_it() {
        let signal = Signal::<u32>::new();
        let late_calls = Arc::new(AtomicUsize::new(0));

        signal
            .once({
                let signal = signal.clone();
                let late_calls = Arc::clone(&late_calls);
                move |_| {
                    let late_calls = Arc::clone(&late_calls);
                    signal
                        .connect(move |_| {
                            late_calls.fetch_add(1, Ordering::Relaxed);
                        })
                        .unwrap();
                }
            })
            .unwrap();

        signal.fire(&1).unwrap();
        assert_eq!(late_calls.load(Ordering::Relaxed), 0);

        signal.fire(&2).unwrap();
        assert_eq!(late_calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_the_rest() {
        let signal = Signal::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        signal
            .connect({
                let calls = Arc::clone(&calls);
                move |_| {
                    calls.fetch_add(1, Ordering::Relaxed);
                }
            })
            .unwrap();
        signal.connect(|_| panic!("subscriber failure")).unwrap();

        let result = signal.fire(&1);

        assert_eq!(
            result,
            Err(Error::CallbackPanicked {
                failures: 1,
                message: "subscriber failure".to_string(),
            })
        );
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn disconnect_validates_owner() {
        let first = Signal::<u32>::new();
        let second = Signal::<u32>::new();
        let connection = first.connect(|_| {}).unwrap();

        assert!(!second.disconnect(&connection));
        assert!(connection.is_connected());

        assert!(first.disconnect(&connection));
        assert!(!first.disconnect(&connection));
        assert!(!first.is_connected_to());
    }

    #[test]
    fn disconnect_all_mid_fire_stops_remaining_subscribers() {
        let signal = Signal::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        signal
            .connect({
                let calls = Arc::clone(&calls);
                move |_| {
                    calls.fetch_add(1, Ordering::Relaxed);
                }
            })
            .unwrap();
        signal
            .connect({
                let signal = signal.clone();
                move |_| signal.disconnect_all()
            })
            .unwrap();

        signal.fire(&1).unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert!(signal.connections().is_empty());
    }

    #[test]
    fn destroyed_signal_rejects_everything() {
        let signal = Signal::<u32>::new();
        signal.destroy();
        signal.destroy();

        assert!(signal.is_destroyed());
        assert_eq!(signal.connect(|_| {}).unwrap_err(), Error::Destroyed);
        assert_eq!(signal.once(|_| {}).unwrap_err(), Error::Destroyed);
        assert_eq!(signal.fire(&1), Err(Error::Destroyed));
        assert_eq!(signal.fire_deferred(1), Err(Error::Destroyed));
        assert_eq!(signal.fire_deferred_pooled(1), Err(Error::Destroyed));
        assert_eq!(signal.wait().block(), Err(Error::Destroyed));
        assert_eq!(scheduler::pending_deferred(), 0);
    }

    #[test]
    fn deferred_call_skips_subscriber_disconnected_before_it_runs() {
        let signal = Signal::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let connection = signal
            .connect({
                let calls = Arc::clone(&calls);
                move |_| {
                    calls.fetch_add(1, Ordering::Relaxed);
                }
            })
            .unwrap();

        signal.fire_deferred(1).unwrap();
        connection.disconnect();
        scheduler::run_deferred();

        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn once_subscriber_runs_once_across_immediate_and_deferred_fires() {
        let signal = Signal::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        signal
            .once({
                let calls = Arc::clone(&calls);
                move |_| {
                    calls.fetch_add(1, Ordering::Relaxed);
                }
            })
            .unwrap();

        signal.fire_deferred(1).unwrap();
        signal.fire_deferred(2).unwrap();
        signal.fire(&3).unwrap();
        scheduler::run_deferred();

        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn pooled_fire_uses_configured_pool() {
        let pool = ExecutionContextPool::builder().max_idle(4).build();
        let signal = Signal::<u32>::builder().context_pool(pool.clone()).build();
        signal.connect(|_| {}).unwrap();
        signal.connect(|_| {}).unwrap();

        signal.fire_deferred_pooled(1).unwrap();
        assert_eq!(pool.idle_count(), 0);

        scheduler::run_deferred();
        assert_eq!(pool.idle_count(), 2);

        signal.fire_deferred_pooled(2).unwrap();
        assert_eq!(pool.idle_count(), 0);
        scheduler::run_deferred();
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn wait_abandoned_by_disconnect_all() {
        with_watchdog(|| {
            let signal = Signal::<u32>::builder().debug_mode(true).build();
            let wait = signal.wait();

            signal.disconnect_all();

            assert_eq!(wait.block(), Err(Error::WaitAbandoned));
        });
    }

    #[test]
    fn dropped_wait_disconnects() {
        let signal = Signal::<u32>::new();

        let wait = signal.wait();
        assert_eq!(signal.connection_count(), 1);

        drop(wait);
        assert_eq!(signal.connection_count(), 0);
        assert!(!signal.is_connected_to());
    }

    #[test]
    fn disconnected_handle_does_not_keep_older_callbacks_alive() {
        struct DropFlag(Arc<AtomicBool>);

        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::Relaxed);
            }
        }

        let signal = Signal::<u32>::new();
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(Arc::clone(&dropped));

        let older = signal
            .connect(move |_| assert!(!flag.0.load(Ordering::Relaxed)))
            .unwrap();
        let newer = signal.connect(|_| {}).unwrap();

        older.disconnect();
        newer.disconnect();
        drop(older);

        // `newer` still links to the older node, but not to its callback.
        assert!(dropped.load(Ordering::Relaxed));
        assert!(!newer.is_connected());
    }

    #[cfg_attr(miri, ignore)] // Too slow under Miri.
    #[test]
    fn held_handle_to_long_detached_chain_drops_without_recursion() {
        let signal = Signal::<u32>::new();
        for _ in 0..200_000 {
            signal.connect(|_| {}).unwrap();
        }
        let newest = signal.connect(|_| {}).unwrap();

        signal.disconnect_all();
        drop(signal);

        thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(move || drop(newest))
            .unwrap()
            .join()
            .unwrap();
    }

    #[test]
    fn name_is_kept() {
        let signal = Signal::<u32>::builder().name("clicks").build();

        assert_eq!(signal.name(), Some("clicks"));
        assert_eq!(Signal::<u32>::new().name(), None);
    }

    #[test]
    fn downcast_ref_finds_matching_signal_type() {
        let signal = Signal::<u32>::new();
        let value: &dyn Any = &signal;

        assert!(Signal::<u32>::downcast_ref(value).is_some());
        assert!(Signal::<u64>::downcast_ref(value).is_none());
        assert!(!Signal::<u64>::is(value));
    }
}
