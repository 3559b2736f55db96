//! Producers stream integers and finish with a `-1` sentinel; the consumer
//! stops after it has seen one sentinel per producer.
//!
//! Run with: `RUST_LOG=dataflow_channel=debug cargo run --release --example sentinel`

use dataflow_channel::{mpoc, Config};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

const PRODUCERS: usize = 8;
const MSG_PER_PRODUCER: i64 = 10_000_000;
const SENTINEL: i64 = -1;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let channel = mpoc::Channel::<i64>::new(Config::default().metrics(true));
    let consumer = channel.consumer().expect("fresh channel has no consumer");
    let barrier = Arc::new(Barrier::new(PRODUCERS + 1));

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let producer = channel.register();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let start = Instant::now();
                for i in 0..MSG_PER_PRODUCER {
                    producer.write(i);
                }
                producer.write(SENTINEL);
                println!("producer {} done in {:?}", producer.id(), start.elapsed());
            })
        })
        .collect();

    barrier.wait();
    let start = Instant::now();
    let mut finished = 0;
    let mut received = 0u64;
    while finished < PRODUCERS {
        match consumer.try_read() {
            Some(SENTINEL) => finished += 1,
            Some(_) => received += 1,
            None => std::hint::spin_loop(),
        }
    }
    let elapsed = start.elapsed();

    for h in handles {
        h.join().unwrap();
    }

    let m = channel.metrics();
    println!(
        "received {} values in {:?} ({:.1} M/s)",
        received,
        elapsed,
        received as f64 / elapsed.as_secs_f64() / 1e6
    );
    println!(
        "segments: {} allocated, {} recycled",
        m.segments_allocated, m.segments_recycled
    );
}
