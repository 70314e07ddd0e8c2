//! Process-wide flag that tells whether the host delivers events deferred or immediately.
//!
//! [`Signal::fire_bindable()`][crate::Signal::fire_bindable] and
//! [`Signal::fire_bindable_pooled()`][crate::Signal::fire_bindable_pooled] follow this flag so
//! that a signal fired from host glue code behaves the same way as the host's own events.
//!
//! The flag is resolved exactly once per process, on first use:
//!
//! 1. If the host called [`init_with_probe()`] first, the probe decides.
//! 2. Otherwise the [`EVENT_MODE_ENV`] environment variable decides (`deferred` or
//!    `immediate`).
//! 3. Otherwise events are immediate.
//!
//! Later calls to [`init_with_probe()`] do not run their probe and return the resolved value.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::{NativeEvent, NativeSubscription};

/// Environment variable consulted when no probe has resolved the event mode.
pub const EVENT_MODE_ENV: &str = "RELAY_SIGNAL_EVENT_MODE";

static DEFERRED_EVENTS: OnceLock<bool> = OnceLock::new();

/// Whether host events are delivered deferred (`true`) or immediately (`false`).
///
/// Resolves the flag on first call; every later call returns the cached value.
#[must_use]
pub fn deferred_events() -> bool {
    *DEFERRED_EVENTS.get_or_init(resolve_from_environment)
}

/// Resolves the flag with `probe` unless it has already been resolved.
///
/// Returns the flag value in effect for the process, which is the cached value if the flag
/// was resolved earlier.
pub fn init_with_probe<P>(probe: P) -> bool
where
    P: FnOnce() -> bool,
{
    *DEFERRED_EVENTS.get_or_init(|| {
        let deferred = probe();
        debug!(deferred, source = "probe", "resolved event mode");
        deferred
    })
}

/// Fires a native event with a no-op round trip and reports whether its handler was deferred.
///
/// Subscribes a marker handler to `source`, calls `trigger` (which must make `source` fire),
/// then unsubscribes. If the handler did not run before `trigger` returned, the host defers
/// its events.
///
/// Intended to be passed to [`init_with_probe()`]:
///
/// ```rust
/// # use std::sync::{Arc, Mutex};
/// # use relay_signal::{NativeCallback, NativeEvent, capability};
/// # #[derive(Default)]
/// # struct HostEvent(Arc<Mutex<Option<NativeCallback<()>>>>);
/// # impl HostEvent {
/// #     fn fire(&self) {
/// #         if let Some(callback) = &*self.0.lock().unwrap() {
/// #             callback(&());
/// #         }
/// #     }
/// # }
/// # impl NativeEvent<()> for HostEvent {
/// #     type Subscription = Box<dyn FnOnce() + Send>;
/// #     fn subscribe(&self, callback: NativeCallback<()>) -> Self::Subscription {
/// #         *self.0.lock().unwrap() = Some(callback);
/// #         let slot = Arc::clone(&self.0);
/// #         Box::new(move || *slot.lock().unwrap() = None)
/// #     }
/// # }
/// let host_event = HostEvent::default();
///
/// let deferred = capability::init_with_probe(|| {
///     capability::probe_round_trip(&host_event, || host_event.fire())
/// });
///
/// assert_eq!(deferred, capability::deferred_events());
/// ```
pub fn probe_round_trip<A, E, T>(source: &E, trigger: T) -> bool
where
    A: 'static,
    E: NativeEvent<A>,
    T: FnOnce(),
{
    let ran = Arc::new(AtomicBool::new(false));

    let subscription = source.subscribe(Box::new({
        let ran = Arc::clone(&ran);
        move |_: &A| ran.store(true, Ordering::Release)
    }));

    trigger();
    let deferred = !ran.load(Ordering::Acquire);

    subscription.unsubscribe();

    deferred
}

fn resolve_from_environment() -> bool {
    let deferred = match env::var(EVENT_MODE_ENV) {
        Ok(value) => parse_event_mode(&value).unwrap_or_else(|| {
            warn!(
                variable = EVENT_MODE_ENV,
                value = %value,
                "unrecognized event mode, falling back to immediate"
            );
            false
        }),
        Err(_) => false,
    };

    debug!(deferred, source = "environment", "resolved event mode");

    deferred
}

/// Parses an event mode name. Returns `Some(true)` for deferred and `Some(false)` for
/// immediate.
fn parse_event_mode(value: &str) -> Option<bool> {
    let value = value.trim();

    if value.eq_ignore_ascii_case("deferred") {
        Some(true)
    } else if value.eq_ignore_ascii_case("immediate") {
        Some(false)
    } else {
        None
    }
}
