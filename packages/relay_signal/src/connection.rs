//! Subscription records and the handles handed out to subscribers.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::SignalCore;

/// A subscriber callback. Receives the fired arguments by reference.
pub(crate) type Callback<A> = dyn Fn(&A) + Send + Sync;

/// A one-shot continuation that hands the fired arguments to a suspended waiter.
pub(crate) type Resume<A> = Box<dyn FnOnce(&A) + Send>;

/// What a connection does when a fire reaches it.
pub(crate) enum Handler<A> {
    /// A regular subscriber. Emptied on disconnect, so a handle or a traversal that still
    /// reaches the node does not keep the callback and its captures alive.
    Callback(Mutex<Option<Arc<Callback<A>>>>),

    /// A pending `wait()`. The continuation is taken on first use; dropping it without
    /// calling it wakes the waiter with a terminal outcome.
    Resume(Mutex<Option<Resume<A>>>),
}

impl<A> Handler<A> {
    pub(crate) fn callback<F>(callback: F) -> Self
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        Self::Callback(Mutex::new(Some(Arc::new(callback))))
    }

    pub(crate) fn resume(resume: Resume<A>) -> Self {
        Self::Resume(Mutex::new(Some(resume)))
    }
}

/// One subscription in a signal's connection list.
pub(crate) struct Node<A> {
    handler: Handler<A>,
    once: bool,

    /// Flips to `false` exactly once. Whoever performs the flip owns the disconnect
    /// (or, for once-connections, the single invocation).
    connected: AtomicBool,

    /// Link to the next (older) connection.
    ///
    /// Only rewritten while the owning registry's head lock is held. A node that has been
    /// unlinked keeps its `next` so that a traversal standing on it can still move forward.
    pub(crate) next: Mutex<Option<Arc<Node<A>>>>,

    owner: Weak<SignalCore<A>>,
}

impl<A> Node<A> {
    pub(crate) fn new(handler: Handler<A>, once: bool, owner: Weak<SignalCore<A>>) -> Self {
        Self {
            handler,
            once,
            connected: AtomicBool::new(true),
            next: Mutex::new(None),
            owner,
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn is_once(&self) -> bool {
        self.once
    }

    /// Whether this node belongs to a pending `wait()` that has not been resumed yet.
    pub(crate) fn is_pending_wait(&self) -> bool {
        match &self.handler {
            Handler::Callback(_) => false,
            Handler::Resume(slot) => slot.lock().is_some(),
        }
    }

    pub(crate) fn is_owned_by(&self, owner: &Arc<SignalCore<A>>) -> bool {
        Weak::as_ptr(&self.owner) == Arc::as_ptr(owner)
    }

    /// Marks the node disconnected without touching the list it lives in.
    ///
    /// Returns `false` if it was already disconnected. The handler is dropped: a callback
    /// stays alive only for calls already in flight, and a pending waiter is resumed with a
    /// terminal outcome.
    pub(crate) fn release(&self) -> bool {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return false;
        }

        self.drop_handler();
        true
    }

    fn drop_handler(&self) {
        // Taken under the lock, dropped outside it. Dropping a continuation wakes the waiter
        // and dropping a callback may run arbitrary destructors.
        match &self.handler {
            Handler::Callback(slot) => {
                let callback = slot.lock().take();
                drop(callback);
            }
            Handler::Resume(slot) => {
                let resume = slot.lock().take();
                drop(resume);
            }
        }
    }

    /// Takes the single invocation of a connection ahead of running it.
    ///
    /// For once-connections this disconnects the node and returns `true` only for the one
    /// caller that won the flip. For regular connections it is a liveness check.
    pub(crate) fn claim(self: &Arc<Self>) -> bool {
        if !self.once {
            return self.is_connected();
        }

        if !self.connected.swap(false, Ordering::AcqRel) {
            return false;
        }

        self.unlink_from_owner();
        true
    }

    /// Runs the handler with the given arguments.
    ///
    /// Callers are expected to have claimed the node first. Does nothing if the node was
    /// disconnected after the claim. A once-node gives up its callback here, since it can
    /// never be invoked again.
    pub(crate) fn invoke(&self, args: &A) {
        match &self.handler {
            Handler::Callback(slot) => {
                let callback = if self.once {
                    slot.lock().take()
                } else {
                    slot.lock().clone()
                };

                if let Some(callback) = callback {
                    callback(args);
                }
            }
            Handler::Resume(slot) => {
                let resume = slot.lock().take();

                if let Some(resume) = resume {
                    resume(args);
                }
            }
        }
    }

    /// Disconnects the node and removes it from its owner's list.
    ///
    /// Idempotent. Safe to call from within a callback that a fire is currently running.
    pub(crate) fn disconnect(self: &Arc<Self>) -> bool {
        if !self.release() {
            return false;
        }

        self.unlink_from_owner();
        true
    }

    fn unlink_from_owner(self: &Arc<Self>) {
        if let Some(owner) = self.owner.upgrade() {
            owner.registry.unlink(self);
        }
    }
}

impl<A> Drop for Node<A> {
    fn drop(&mut self) {
        // Unwind the tail iteratively; the default drop recurses once per node.
        let mut next = self.next.get_mut().take();

        while let Some(node) = next {
            next = match Arc::try_unwrap(node) {
                Ok(mut node) => node.next.get_mut().take(),
                // Still referenced elsewhere. Whoever lets go last continues from there.
                Err(_shared) => None,
            };
        }
    }
}

impl<A> fmt::Debug for Node<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.handler {
            Handler::Callback(_) => "callback",
            Handler::Resume(_) => "wait",
        };

        f.debug_struct("Node")
            .field("kind", &kind)
            .field("once", &self.once)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// A handle to one subscription on a [`Signal`][crate::Signal].
///
/// Returned by [`Signal::connect()`][crate::Signal::connect] and
/// [`Signal::once()`][crate::Signal::once]. Handles are cheap to clone; all clones refer to
/// the same subscription. Two handles compare equal if they refer to the same subscription.
///
/// Dropping a handle does **not** disconnect the subscription. Call
/// [`disconnect()`][Self::disconnect] to stop receiving fires.
///
/// # Example
///
/// ```rust
/// use relay_signal::Signal;
///
/// let signal = Signal::<u32>::new();
/// let connection = signal.connect(|value| println!("got {value}")).unwrap();
///
/// assert!(connection.is_connected());
/// connection.disconnect();
/// assert!(!connection.is_connected());
///
/// // Disconnecting again is a no-op.
/// connection.disconnect();
/// ```
pub struct Connection<A> {
    node: Arc<Node<A>>,
}

impl<A> Connection<A> {
    pub(crate) fn new(node: Arc<Node<A>>) -> Self {
        Self { node }
    }

    pub(crate) fn node(&self) -> &Arc<Node<A>> {
        &self.node
    }

    /// Stops this subscription from receiving any further fires.
    ///
    /// Idempotent. Safe to call from inside any callback, including this subscription's own
    /// callback while a fire is running it. Deferred calls that were already scheduled for
    /// this subscription but have not run yet are skipped.
    pub fn disconnect(&self) {
        self.node.disconnect();
    }

    /// Whether the subscription still receives fires.
    ///
    /// Once-subscriptions report `false` as soon as a fire has claimed them.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.node.is_connected()
    }

    /// Whether this subscription disconnects itself after its first invocation.
    #[must_use]
    pub fn is_once(&self) -> bool {
        self.node.is_once()
    }
}

impl<A> Clone for Connection<A> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<A> PartialEq for Connection<A> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl<A> Eq for Connection<A> {}

impl<A> fmt::Debug for Connection<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("node", &self.node)
            .finish()
    }
}
