//! Bindable firing with the process-wide event mode pinned to deferred.
//!
//! The event mode is resolved once per process, so these tests live in their own binary and
//! every one of them pins the mode before touching a signal.

use relay_signal::{ExecutionContextPool, Signal, capability, scheduler};
use testing::Recorder;

fn pin_deferred_mode() {
    assert!(capability::init_with_probe(|| true));
}

#[test]
fn probe_result_wins_over_later_probes() {
    pin_deferred_mode();

    assert!(capability::init_with_probe(|| false));
    assert!(capability::deferred_events());
}

#[test]
fn fire_bindable_defers_in_deferred_mode() {
    pin_deferred_mode();

    let signal = Signal::<u32>::new();
    let recorder = Recorder::<u32>::new();
    signal.connect(recorder.sink()).unwrap();

    signal.fire_bindable(3).unwrap();
    assert!(recorder.is_empty());

    scheduler::run_deferred();
    assert_eq!(recorder.take(), [3]);
}

#[test]
fn fire_bindable_pooled_uses_the_pool_in_deferred_mode() {
    pin_deferred_mode();

    let pool = ExecutionContextPool::new();
    let signal = Signal::<u32>::builder().context_pool(pool.clone()).build();
    let recorder = Recorder::<u32>::new();
    signal.connect(recorder.sink()).unwrap();

    signal.fire_bindable_pooled(4).unwrap();
    assert!(recorder.is_empty());
    assert_eq!(scheduler::pending_deferred(), 1);

    scheduler::run_deferred();
    assert_eq!(recorder.take(), [4]);
    assert_eq!(pool.idle_count(), 1);
}
