//! Example demonstrating immediate, deferred and pooled firing, plus waiting for a fire.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

use relay_signal::{Signal, scheduler};

fn main() {
    let temperature = Signal::<(String, f64)>::builder()
        .name("temperature")
        .build();

    let readings = Arc::new(AtomicU32::new(0));

    temperature
        .connect({
            let readings = Arc::clone(&readings);
            move |(sensor, celsius)| {
                println!("{sensor} reports {celsius:.1} C");
                readings.fetch_add(1, Ordering::Relaxed);
            }
        })
        .expect("signal was just created");

    temperature
        .once(|(sensor, _)| println!("first reading came from {sensor}"))
        .expect("signal was just created");

    println!("Immediate fire:");
    temperature
        .fire(&("kitchen".to_string(), 21.5))
        .expect("no subscriber panics");

    println!("Deferred fire (nothing runs until the queue is drained):");
    temperature
        .fire_deferred(("garage".to_string(), 9.0))
        .expect("signal is alive");
    println!("  {} call(s) queued", scheduler::pending_deferred());
    scheduler::run_deferred();

    println!("Pooled deferred fire:");
    for reading in 0..3_u32 {
        temperature
            .fire_deferred_pooled(("attic".to_string(), f64::from(reading) + 30.0))
            .expect("signal is alive");
    }
    scheduler::run_deferred();

    println!("Waiting for a fire from another thread...");
    let next = temperature.wait();
    let producer = thread::spawn({
        let temperature = temperature.clone();
        move || {
            temperature
                .fire(&("balcony".to_string(), 4.25))
                .expect("no subscriber panics");
        }
    });

    let (sensor, celsius) = next
        .block()
        .expect("the signal is not destroyed while we wait");
    producer.join().expect("producer thread does not panic");
    println!("Woke up with {sensor} at {celsius} C");

    temperature.destroy();

    let total = readings.load(Ordering::Relaxed);
    println!("Processed {total} readings");
    assert_eq!(total, 6);
}
