//! Many producers, one consumer, no cross-producer order.
//!
//! Every producer owns a ring found through the registry, so producers never
//! contend with each other on the hot path. The single consumer roams the
//! registry's ring list round-robin, staying on a ring while it yields values
//! and moving on when it is exhausted. Each producer's values arrive in the
//! order it wrote them; values from different producers interleave
//! arbitrarily.

use crate::registry::Registry;
use crate::{ChannelError, Config, MetricsSnapshot};
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Multi-producer single-consumer channel without ordering across producers.
pub struct Channel<T> {
    inner: Arc<ChannelInner<T>>,
}

struct ChannelInner<T> {
    registry: Registry<T>,
    consumer_claimed: AtomicBool,
}

impl<T> Channel<T> {
    /// Creates a new channel with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                registry: Registry::new(config),
                consumer_claimed: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a channel whose segments hold `capacity` slots (rounded up to
    /// a power of two).
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(Config::with_capacity(capacity))
    }

    /// Registers a new producer and publishes its ring.
    ///
    /// Any number of producers may register; the registry table grows as
    /// needed.
    pub fn register(&self) -> Producer<T> {
        let id = self.inner.registry.next_id();
        self.inner.registry.resolve(id);
        Producer {
            channel: Arc::clone(&self.inner),
            id,
            _not_sync: PhantomData,
        }
    }

    /// Claims the consumer side. Fails while another `Consumer` is alive.
    pub fn consumer(&self) -> Result<Consumer<T>, ChannelError> {
        if self.inner.consumer_claimed.swap(true, Ordering::Acquire) {
            return Err(ChannelError::ConsumerClaimed);
        }
        Ok(Consumer {
            channel: Arc::clone(&self.inner),
            _not_sync: PhantomData,
        })
    }

    /// True iff every registered ring is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.registry.is_empty()
    }

    /// Number of unread values across all rings. Diagnostic, not wait-free.
    pub fn count(&self) -> usize {
        self.inner.registry.count()
    }

    /// Number of rings in the current channel state.
    pub fn producer_count(&self) -> usize {
        self.inner.registry.producer_count()
    }

    /// Resets the channel to an empty state of the same registry size.
    ///
    /// Call only while no `write`/`try_read` is in flight. Producers
    /// re-register on their next write.
    pub fn clear(&self) {
        self.inner.registry.clear();
    }

    /// Returns the channel configuration.
    pub fn config(&self) -> &Config {
        self.inner.registry.config()
    }

    /// Snapshot of the metrics, all zero unless enabled in the config.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.registry.metrics()
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Producer handle for writing to the channel.
///
/// Each producer writes to a dedicated ring. `Send`, not `Sync`, and
/// intentionally not `Clone`: two writers on one ring would break the
/// single-writer protocol.
pub struct Producer<T> {
    channel: Arc<ChannelInner<T>>,
    id: usize,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T> Producer<T> {
    /// Get the producer's registry id.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Appends a value to this producer's ring. Never fails.
    #[inline]
    pub fn write(&self, value: T) {
        let ring = self.channel.registry.resolve(self.id);
        // SAFETY: ids are unique per handle and the handle is not Sync, so
        // this is the ring's only writer.
        unsafe { ring.push(value) }
    }
}

/// The single consumer handle. `Send`, not `Sync`, not `Clone`.
pub struct Consumer<T> {
    channel: Arc<ChannelInner<T>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T> Consumer<T> {
    /// Takes a value from the first ring that has one, starting where the
    /// previous call left off. `None` once every ring was visited empty.
    pub fn try_read(&self) -> Option<T> {
        let state = self.channel.registry.state();
        let start = state.reader();
        if start.is_null() {
            return None;
        }

        let mut cur = start;
        // SAFETY: this is the channel's only consumer, so it holds the read
        // side of every ring; rings live as long as the registry.
        unsafe {
            loop {
                if let Some(value) = (*cur).pop() {
                    return Some(value);
                }

                cur = state.successor(cur);
                state.set_reader(cur);

                if cur == start {
                    return None;
                }
            }
        }
    }

    /// See [`Channel::is_empty`].
    pub fn is_empty(&self) -> bool {
        self.channel.registry.is_empty()
    }

    /// See [`Channel::count`].
    pub fn count(&self) -> usize {
        self.channel.registry.count()
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        self.channel.consumer_claimed.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_channel() {
        let ch = Channel::<u64>::with_capacity(8);
        let consumer = ch.consumer().unwrap();
        assert!(ch.is_empty());
        assert_eq!(consumer.try_read(), None);

        // A registered but silent producer keeps it empty.
        let _p = ch.register();
        assert!(ch.is_empty());
        assert_eq!(consumer.try_read(), None);
        assert_eq!(ch.producer_count(), 1);
    }

    #[test]
    fn test_round_robin_visits_every_producer() {
        let ch = Channel::<(usize, u64)>::with_capacity(8);
        let producers: Vec<_> = (0..3).map(|_| ch.register()).collect();
        let consumer = ch.consumer().unwrap();

        for p in &producers {
            for i in 0..5 {
                p.write((p.id(), i));
            }
        }
        assert_eq!(ch.count(), 15);

        let mut next = vec![0u64; 3];
        while let Some((id, v)) = consumer.try_read() {
            assert_eq!(v, next[id], "producer {} out of order", id);
            next[id] += 1;
        }
        assert_eq!(next, vec![5, 5, 5]);
        assert!(ch.is_empty());
    }

    #[test]
    fn test_consumer_stays_on_ring_with_values() {
        let ch = Channel::<u64>::with_capacity(8);
        let a = ch.register();
        let b = ch.register();
        let consumer = ch.consumer().unwrap();

        a.write(1);
        a.write(2);
        b.write(100);

        // The cursor starts at the first registered ring and drains it
        // before moving to the next one.
        assert_eq!(consumer.try_read(), Some(1));
        assert_eq!(consumer.try_read(), Some(2));
        assert_eq!(consumer.try_read(), Some(100));
        assert_eq!(consumer.try_read(), None);
    }

    #[test]
    fn test_single_consumer() {
        let ch = Channel::<u64>::default();
        let consumer = ch.consumer().unwrap();
        assert!(matches!(ch.consumer(), Err(ChannelError::ConsumerClaimed)));
        drop(consumer);
        assert!(ch.consumer().is_ok());
    }

    #[test]
    fn test_clear_forces_reregistration() {
        let ch = Channel::<u64>::new(Config::with_capacity(4).metrics(true));
        let p = ch.register();
        let consumer = ch.consumer().unwrap();

        for i in 0..6 {
            p.write(i);
        }
        ch.clear();
        assert!(ch.is_empty());
        assert_eq!(ch.producer_count(), 0);
        assert_eq!(consumer.try_read(), None);

        p.write(42);
        assert_eq!(ch.producer_count(), 1);
        assert_eq!(consumer.try_read(), Some(42));

        let m = ch.metrics();
        assert_eq!(m.clears, 1);
        assert_eq!(m.registrations, 2);
    }
}
