//! Property-based tests over arbitrary write/read interleavings.
//!
//! Each case drives a channel single-threaded against a `VecDeque` model and
//! checks that the channel agrees with it after every step.

use dataflow_channel::{mpmc, mpoc, opoc, Config};
use proptest::prelude::*;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
enum Op {
    Write(u32),
    Read,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<u32>().prop_map(Op::Write),
        2 => Just(Op::Read),
    ]
}

/// (producer index, op)
fn multi_op(producers: usize) -> impl Strategy<Value = (usize, Op)> {
    (0..producers, op())
}

proptest! {
    /// A single ring behaves exactly like a FIFO queue, whatever the segment
    /// size and however far the reader lags.
    #[test]
    fn prop_opoc_matches_fifo_model(
        bits in 1u8..5,
        ops in prop::collection::vec(op(), 0..400),
    ) {
        let ch = opoc::Channel::<u32>::new(Config::default().segment_capacity(1 << bits));
        let producer = ch.producer().unwrap();
        let consumer = ch.consumer().unwrap();
        let mut model = VecDeque::new();

        for op in ops {
            match op {
                Op::Write(v) => {
                    producer.write(v);
                    model.push_back(v);
                }
                Op::Read => {
                    prop_assert_eq!(consumer.try_read(), model.pop_front());
                }
            }
            prop_assert_eq!(ch.count(), model.len());
            prop_assert_eq!(ch.is_empty(), model.is_empty());
        }

        while let Some(expected) = model.pop_front() {
            prop_assert_eq!(consumer.try_read(), Some(expected));
        }
        prop_assert_eq!(consumer.try_read(), None);
        prop_assert!(ch.is_empty());
    }

    /// Segments are only allocated while the reader lags by more than the
    /// preallocated capacity.
    #[test]
    fn prop_opoc_segment_count_bounded_by_backlog(
        ops in prop::collection::vec(op(), 0..300),
    ) {
        let capacity = 4usize;
        let ch = opoc::Channel::<u32>::with_capacity(capacity);
        let producer = ch.producer().unwrap();
        let consumer = ch.consumer().unwrap();
        let mut backlog = 0usize;
        let mut peak = 0usize;

        for op in ops {
            match op {
                Op::Write(v) => {
                    producer.write(v);
                    backlog += 1;
                }
                Op::Read => {
                    if consumer.try_read().is_some() {
                        backlog -= 1;
                    }
                }
            }
            peak = peak.max(backlog);
            // The reader's segment may be partially consumed and the
            // writer's partially filled, so allow two extra segments.
            prop_assert!(
                ch.segment_count() <= peak / capacity + 2,
                "{} segments for a peak backlog of {}", ch.segment_count(), peak
            );
        }
    }

    /// Across several producers every value arrives once and each producer's
    /// values keep their order.
    #[test]
    fn prop_mpoc_per_producer_fifo(
        producers in 1usize..6,
        ops in prop::collection::vec(multi_op(6), 0..400),
    ) {
        let ch = mpoc::Channel::<(usize, u32)>::with_capacity(4);
        let handles: Vec<_> = (0..producers).map(|_| ch.register()).collect();
        let consumer = ch.consumer().unwrap();
        let mut models = vec![VecDeque::new(); producers];

        for (p, op) in ops {
            let p = p % producers;
            match op {
                Op::Write(v) => {
                    handles[p].write((p, v));
                    models[p].push_back(v);
                }
                Op::Read => {
                    if let Some((from, v)) = consumer.try_read() {
                        prop_assert_eq!(models[from].pop_front(), Some(v));
                    } else {
                        prop_assert!(models.iter().all(VecDeque::is_empty));
                    }
                }
            }
            let pending: usize = models.iter().map(VecDeque::len).sum();
            prop_assert_eq!(ch.count(), pending);
        }

        while let Some((from, v)) = consumer.try_read() {
            prop_assert_eq!(models[from].pop_front(), Some(v));
        }
        prop_assert!(models.iter().all(VecDeque::is_empty));
    }

    /// Two consumers alternating on an MPMC channel split the values between
    /// them without losing or repeating any.
    #[test]
    fn prop_mpmc_consumers_partition_values(
        producers in 1usize..4,
        ops in prop::collection::vec(multi_op(4), 0..300),
    ) {
        let ch = mpmc::Channel::<(usize, u32)>::with_capacity(4);
        let handles: Vec<_> = (0..producers).map(|_| ch.register()).collect();
        let consumers = [ch.register_consumer(), ch.register_consumer()];
        let mut models = vec![VecDeque::new(); producers];
        let mut turn = 0;

        for (p, op) in ops {
            let p = p % producers;
            match op {
                Op::Write(v) => {
                    handles[p].write((p, v));
                    models[p].push_back(v);
                }
                Op::Read => {
                    let consumer = &consumers[turn % 2];
                    turn += 1;
                    if let Some((from, v)) = consumer.try_read() {
                        prop_assert_eq!(models[from].pop_front(), Some(v));
                    } else {
                        prop_assert!(models.iter().all(VecDeque::is_empty));
                    }
                }
            }
        }

        for consumer in &consumers {
            while let Some((from, v)) = consumer.try_read() {
                prop_assert_eq!(models[from].pop_front(), Some(v));
            }
        }
        prop_assert!(models.iter().all(VecDeque::is_empty));
    }
}
