//! Example demonstrating a signal driven by a native event source and torn down by a janitor.
//!
//! Trace-level logging is enabled so the signal lifecycle events are visible.

use std::sync::Arc;

use parking_lot::Mutex;
use relay_signal::{Janitor, NativeCallback, NativeEvent, Signal};
use tracing::Level;

/// Stand-in for an event owned by some other system, such as a UI toolkit.
#[derive(Default)]
struct HostButton {
    handler: Arc<Mutex<Option<NativeCallback<u32>>>>,
}

impl HostButton {
    fn press(&self, times: u32) {
        if let Some(handler) = &*self.handler.lock() {
            handler(&times);
        } else {
            println!("button pressed {times} time(s), nobody listening");
        }
    }
}

impl NativeEvent<u32> for HostButton {
    type Subscription = Box<dyn FnOnce() + Send>;

    fn subscribe(&self, callback: NativeCallback<u32>) -> Self::Subscription {
        *self.handler.lock() = Some(callback);

        let handler = Arc::clone(&self.handler);
        Box::new(move || *handler.lock() = None)
    }
}

fn main() {
    tracing_subscriber::fmt().with_max_level(Level::TRACE).init();

    let button = HostButton::default();
    let janitor = Janitor::new();

    let pressed = Signal::builder()
        .name("pressed")
        .debug_mode(true)
        .janitor(&janitor)
        .build_wrapped(&button);

    pressed
        .connect(|times| println!("button pressed {times} time(s)"))
        .expect("signal was just created");

    button.press(1);
    button.press(2);

    // The janitor destroys the signal, which unsubscribes from the button.
    janitor.cleanup();

    button.press(3);
    assert!(pressed.is_destroyed());
}
