//! Adapting externally owned event sources into signals.

use std::sync::Arc;

use tracing::{debug, error};

use crate::{Error, Signal, SignalBuilder};

/// The callback a [`NativeEvent`] invokes on every firing of the native source.
pub type NativeCallback<A> = Box<dyn Fn(&A) + Send + Sync>;

/// An event source owned by someone else that a [`Signal`] can be driven by.
///
/// The source decides when and how its subscribers run; a wrapped signal re-fires on the
/// same stack as the native callback, so an immediate source yields immediate re-fires and a
/// deferred source yields deferred ones.
pub trait NativeEvent<A> {
    /// Handle that ends the subscription made by [`subscribe()`][Self::subscribe].
    type Subscription: NativeSubscription;

    /// Registers `callback` to run on every firing of the source.
    fn subscribe(&self, callback: NativeCallback<A>) -> Self::Subscription;
}

/// Ends a subscription made through [`NativeEvent::subscribe()`].
pub trait NativeSubscription: Send + 'static {
    /// Stops the native source from invoking the subscribed callback.
    fn unsubscribe(self);
}

impl<F> NativeSubscription for F
where
    F: FnOnce() + Send + 'static,
{
    fn unsubscribe(self) {
        self();
    }
}

impl<A> Signal<A>
where
    A: Send + Sync + 'static,
{
    /// Creates a signal that re-fires every value delivered by `source`.
    ///
    /// The signal subscribes to `source` immediately. [`destroy()`][Self::destroy] ends that
    /// subscription, as does dropping every handle to the signal.
    ///
    /// ```rust
    /// use std::sync::{Arc, Mutex};
    ///
    /// use relay_signal::{NativeCallback, NativeEvent, Signal};
    ///
    /// #[derive(Default)]
    /// struct Button {
    ///     on_click: Arc<Mutex<Option<NativeCallback<u32>>>>,
    /// }
    ///
    /// impl Button {
    ///     fn click(&self, times: u32) {
    ///         if let Some(callback) = &*self.on_click.lock().unwrap() {
    ///             callback(&times);
    ///         }
    ///     }
    /// }
    ///
    /// impl NativeEvent<u32> for Button {
    ///     type Subscription = Box<dyn FnOnce() + Send>;
    ///
    ///     fn subscribe(&self, callback: NativeCallback<u32>) -> Self::Subscription {
    ///         *self.on_click.lock().unwrap() = Some(callback);
    ///         let slot = Arc::clone(&self.on_click);
    ///         Box::new(move || *slot.lock().unwrap() = None)
    ///     }
    /// }
    ///
    /// let button = Button::default();
    /// let clicks = Signal::wrap(&button);
    /// let wait = clicks.wait();
    ///
    /// button.click(2);
    /// assert_eq!(wait.block(), Ok(2));
    /// ```
    #[must_use]
    pub fn wrap<E>(source: &E) -> Self
    where
        E: NativeEvent<A>,
    {
        Self::builder().build_wrapped(source)
    }

    fn attach_native<E>(&self, source: &E)
    where
        E: NativeEvent<A>,
    {
        let weak = Arc::downgrade(self.core());

        let subscription = source.subscribe(Box::new(move |args: &A| {
            let Some(core) = weak.upgrade() else {
                return;
            };

            let signal = Self::from_core(core);

            match signal.fire(args) {
                // Panics were already logged per subscriber. A destroy may race with a native
                // fire that is already in progress.
                Ok(()) | Err(Error::CallbackPanicked { .. } | Error::Destroyed) => {}
                Err(other) => {
                    error!(signal = signal.name(), error = %other, "forwarding native event failed");
                }
            }
        }));

        *self.core().native.lock() = Some(Box::new(move || subscription.unsubscribe()));

        debug!(signal = self.name(), "subscribed to native event");
    }
}

impl<A> SignalBuilder<'_, A>
where
    A: Send + Sync + 'static,
{
    /// Builds a signal driven by `source`. See [`Signal::wrap()`].
    #[must_use]
    pub fn build_wrapped<E>(self, source: &E) -> Signal<A>
    where
        E: NativeEvent<A>,
    {
        let (signal, janitor) = self.into_parts();
        signal.attach_native(source);
        signal.register_with(janitor);
        signal
    }
}
