//! Miri-compatible tests for detecting undefined behavior.
//!
//! Run with: `cargo +nightly miri test --test miri_tests`
//!
//! Sizes are tiny so the interpreter finishes quickly, but every unsafe path
//! is reached: segment recycling, segment allocation, registry growth,
//! `clear`, and dropping values left unread in every shape of ring.

use dataflow_channel::{mpmc, mpoc, opoc, Config};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn tiny() -> Config {
    Config::new(1, 1, 2, true) // two slots per segment, table of two
}

#[derive(Debug)]
struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn miri_opoc_grow_and_recycle() {
    let ch = opoc::Channel::<Box<u32>>::new(tiny());
    let producer = ch.producer().unwrap();
    let consumer = ch.consumer().unwrap();

    for round in 0..3u32 {
        for i in 0..5 {
            producer.write(Box::new(round * 10 + i));
        }
        for i in 0..5 {
            assert_eq!(consumer.try_read().as_deref(), Some(&(round * 10 + i)));
        }
        assert!(consumer.try_read().is_none());
    }

    let m = ch.metrics();
    assert!(m.segments_allocated > 0);
    assert!(m.segments_recycled > 0);
}

#[test]
fn miri_unread_values_dropped_once() {
    let drops = Arc::new(AtomicUsize::new(0));

    {
        let ch = opoc::Channel::<DropCounter>::new(tiny());
        let producer = ch.producer().unwrap();
        let consumer = ch.consumer().unwrap();

        for _ in 0..7 {
            producer.write(DropCounter(Arc::clone(&drops)));
        }
        // Leave the reader in the middle of a segment.
        drop(consumer.try_read());
        drop(consumer.try_read());
        drop(consumer.try_read());
        assert_eq!(drops.load(Ordering::SeqCst), 3);
    }

    assert_eq!(drops.load(Ordering::SeqCst), 7);
}

#[test]
fn miri_clear_drops_discarded_values() {
    let drops = Arc::new(AtomicUsize::new(0));

    {
        let ch = mpoc::Channel::<DropCounter>::new(tiny());
        let producer = ch.register();
        let consumer = ch.consumer().unwrap();

        for _ in 0..5 {
            producer.write(DropCounter(Arc::clone(&drops)));
        }
        ch.clear();
        assert!(consumer.try_read().is_none());

        producer.write(DropCounter(Arc::clone(&drops)));
        drop(consumer.try_read());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    assert_eq!(drops.load(Ordering::SeqCst), 6);
}

#[test]
fn miri_registry_growth() {
    let ch = mpoc::Channel::<usize>::new(tiny());
    let consumer = ch.consumer().unwrap();
    let producers: Vec<_> = (0..5).map(|_| ch.register()).collect();

    for p in &producers {
        p.write(p.id());
        p.write(p.id());
        p.write(p.id());
    }

    let mut seen = vec![0; producers.len()];
    while let Some(id) = consumer.try_read() {
        seen[id] += 1;
    }
    assert_eq!(seen, vec![3; 5]);
    assert!(ch.metrics().registry_growths > 0);
}

#[test]
fn miri_mpoc_threads() {
    let ch = mpoc::Channel::<u32>::new(tiny());
    let consumer = ch.consumer().unwrap();

    let handles: Vec<_> = (0..2u32)
        .map(|k| {
            let producer = ch.register();
            std::thread::spawn(move || {
                for i in 0..6 {
                    producer.write(k * 100 + i);
                }
            })
        })
        .collect();

    let mut received = Vec::new();
    while received.len() < 12 {
        if let Some(v) = consumer.try_read() {
            received.push(v);
        } else {
            std::thread::yield_now();
        }
    }
    for h in handles {
        h.join().unwrap();
    }

    received.sort_unstable();
    let mut expected: Vec<u32> = (0..6).chain(100..106).collect();
    expected.sort_unstable();
    assert_eq!(received, expected);
}

#[test]
fn miri_mpmc_threads() {
    let ch = mpmc::Channel::<u32>::new(tiny());
    let producer = ch.register();
    for i in 0..8 {
        producer.write(i);
    }

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let consumer = ch.register_consumer();
            std::thread::spawn(move || {
                let mut local = Vec::new();
                while let Some(v) = consumer.try_read() {
                    local.push(v);
                }
                local
            })
        })
        .collect();

    let mut all: Vec<u32> = Vec::new();
    for h in handles {
        all.extend(h.join().unwrap());
    }
    // A consumer can give up while the other holds the only ring.
    let leftover = ch.register_consumer();
    while let Some(v) = leftover.try_read() {
        all.push(v);
    }

    all.sort_unstable();
    assert_eq!(all, (0..8).collect::<Vec<_>>());
}
