//! Dataflow Channel - Segment-Based Lock-Free Channels
//!
//! Bounded-segment, unbounded-total queues that move values from writer
//! threads to reader threads without locking on the data path. Every
//! producer owns a growable ring of fixed-size segments; segments the reader
//! has drained are recycled instead of freed.
//!
//! Three cardinalities share the same machinery:
//!
//! - [`opoc`]: one producer, one consumer. Wait-free, no CAS anywhere.
//! - [`mpoc`]: many producers, one consumer. Producers find their ring
//!   through a registry (lock-free lookup, spin-locked growth); the consumer
//!   drains rings round-robin. Per-producer FIFO, no order across producers.
//! - [`mpmc`]: many producers, many consumers, each consumer with its own
//!   roaming cursor and a per-ring read claim. No global order.
//!
//! # Key Features
//!
//! - Writes never fail: a lagging consumer makes the ring grow one segment
//!   at a time
//! - A consumer that keeps pace caps memory at the initial segments
//! - Reader and writer cursors on separate cache lines
//! - Producer registration and registry growth off the hot path
//!
//! # Example
//!
//! ```
//! use dataflow_channel::{mpoc, Config};
//! use std::thread;
//!
//! let channel = mpoc::Channel::<u64>::new(Config::with_capacity(1024));
//! let consumer = channel.consumer().unwrap();
//!
//! let handles: Vec<_> = (0..4u64)
//!     .map(|k| {
//!         let producer = channel.register();
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 producer.write(k * 100 + i);
//!             }
//!         })
//!     })
//!     .collect();
//! for h in handles {
//!     h.join().unwrap();
//! }
//!
//! let mut received = 0;
//! while consumer.try_read().is_some() {
//!     received += 1;
//! }
//! assert_eq!(received, 400);
//! ```

mod config;
mod error;
mod invariants;
mod metrics;
mod registry;
mod ring;
mod segment;
mod spin;

pub mod mpmc;
pub mod mpoc;
pub mod opoc;

pub use config::{Config, HIGH_THROUGHPUT_CONFIG, LOW_LATENCY_CONFIG};
pub use error::ChannelError;
pub use metrics::MetricsSnapshot;
pub use spin::Backoff;
