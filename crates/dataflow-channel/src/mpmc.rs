//! Many producers, many consumers, no global order.
//!
//! Producers register exactly as in [`mpoc`](crate::mpoc). Consumers register
//! too, and each one keeps its own roaming cursor over the producer rings.
//! A ring is drained by at most one consumer at a time: a consumer takes the
//! ring's read claim before popping and simply moves on when another
//! consumer holds it, so no consumer ever waits for another.
//!
//! Per-producer FIFO still holds for the values any single consumer sees,
//! and every value is delivered to exactly one consumer. There is no order
//! across producers or across consumers.

use crate::registry::{Registry, State};
use crate::ring::Ring;
use crate::{Config, MetricsSnapshot};
use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Multi-producer multi-consumer channel.
pub struct Channel<T> {
    inner: Arc<ChannelInner<T>>,
}

struct ChannelInner<T> {
    registry: Registry<T>,
    next_consumer: AtomicUsize,
}

impl<T> Channel<T> {
    /// Creates a new channel with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                registry: Registry::new(config),
                next_consumer: AtomicUsize::new(0),
            }),
        }
    }

    /// Creates a channel whose segments hold `capacity` slots (rounded up to
    /// a power of two).
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(Config::with_capacity(capacity))
    }

    /// Registers a new producer and publishes its ring.
    pub fn register(&self) -> Producer<T> {
        let id = self.inner.registry.next_id();
        self.inner.registry.resolve(id);
        Producer {
            channel: Arc::clone(&self.inner),
            id,
            _not_sync: PhantomData,
        }
    }

    /// Registers a new consumer with its own cursor.
    pub fn register_consumer(&self) -> Consumer<T> {
        let id = self.inner.next_consumer.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(consumer = id, "registered consumer");
        Consumer {
            channel: Arc::clone(&self.inner),
            id,
            cursor: Cell::new(ptr::null_mut()),
            epoch: Cell::new(0),
        }
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

    /// Number of consumers registered so far.
    pub fn consumer_count(&self) -> usize {
        self.inner.next_consumer.load(Ordering::Relaxed)
    }

    /// Resets the channel to an empty state of the same registry size.
    ///
    /// Call only while no `write`/`try_read` is in flight.
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

/// Producer handle. `Send`, not `Sync`, not `Clone`.
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
        // SAFETY: ids are unique per handle and the handle is not Sync.
        unsafe { ring.push(value) }
    }
}

/// Consumer handle with a private roaming cursor. `Send`, not `Sync`.
pub struct Consumer<T> {
    channel: Arc<ChannelInner<T>>,
    id: usize,
    /// Ring to try first on the next call
    cursor: Cell<*mut Ring<T>>,
    /// Channel state the cursor belongs to
    epoch: Cell<u64>,
}

// Safety: the cursor points into rings owned by the registry, which the
// handle keeps alive through `channel`. Cell keeps the handle !Sync.
unsafe impl<T: Send> Send for Consumer<T> {}

impl<T> Consumer<T> {
    /// Get the consumer's id.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Takes a value from the first unclaimed ring that has one, starting at
    /// this consumer's cursor. `None` once every ring was visited without
    /// success.
    pub fn try_read(&self) -> Option<T> {
        let state = self.channel.registry.state();
        let start = self.start(state);
        if start.is_null() {
            return None;
        }

        let mut cur = start;
        // SAFETY: rings live as long as the registry; the read claim makes
        // this consumer the ring's only reader while it pops.
        unsafe {
            loop {
                let ring = &*cur;
                if ring.try_claim_read() {
                    let value = ring.pop();
                    ring.release_read();
                    if value.is_some() {
                        self.cursor.set(cur);
                        return value;
                    }
                }

                cur = state.successor(cur);
                if cur == start {
                    self.cursor.set(cur);
                    return None;
                }
            }
        }
    }

    /// Cursor for `state`, reseeded after a `clear()` or on first use.
    ///
    /// Fresh cursors are staggered by consumer id so consumers do not all
    /// start on the same ring.
    fn start(&self, state: &State<T>) -> *mut Ring<T> {
        let cursor = self.cursor.get();
        if !cursor.is_null() && self.epoch.get() == state.epoch() {
            return cursor;
        }

        let head = state.head();
        if head.is_null() {
            return head;
        }

        let mut ring = head;
        let steps = self.id % state.rings().count();
        for _ in 0..steps {
            // SAFETY: ring belongs to `state`.
            ring = unsafe { state.successor(ring) };
        }

        self.epoch.set(state.epoch());
        self.cursor.set(ring);
        ring
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
