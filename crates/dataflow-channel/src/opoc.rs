//! One producer, one consumer.
//!
//! The degenerate case: a single ring and no registry. Both hot paths are
//! wait-free and use no compare-and-swap; correctness rests on each cursor
//! having exactly one writer.
//!
//! # Example
//!
//! ```
//! use dataflow_channel::{opoc, Config};
//!
//! let channel = opoc::Channel::<u64>::new(Config::with_capacity(4));
//! let producer = channel.producer().unwrap();
//! let consumer = channel.consumer().unwrap();
//!
//! for v in [10, 20, 30, 40, 50] {
//!     producer.write(v);
//! }
//! let read: Vec<u64> = std::iter::from_fn(|| consumer.try_read()).collect();
//! assert_eq!(read, vec![10, 20, 30, 40, 50]);
//! assert!(channel.is_empty());
//! ```

use crate::metrics::Metrics;
use crate::ring::Ring;
use crate::spin::SpinLock;
use crate::{ChannelError, Config, MetricsSnapshot};
use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::Arc;

/// Single-producer single-consumer channel.
pub struct Channel<T> {
    inner: Arc<ChannelInner<T>>,
}

struct ChannelInner<T> {
    ring: AtomicPtr<Ring<T>>,
    /// Serializes `clear()`.
    lock: SpinLock,
    /// Rings replaced by `clear()`, freed on drop. Guarded by `lock`.
    retired: UnsafeCell<Vec<Box<Ring<T>>>>,
    producer_claimed: AtomicBool,
    consumer_claimed: AtomicBool,
    config: Config,
    metrics: Metrics,
}

// Safety: `retired` is only touched under `lock`; the ring itself is
// Send + Sync for T: Send.
unsafe impl<T: Send> Send for ChannelInner<T> {}
unsafe impl<T: Send> Sync for ChannelInner<T> {}

impl<T> ChannelInner<T> {
    #[inline]
    fn ring(&self) -> &Ring<T> {
        // SAFETY: rings are only freed when the channel is dropped.
        unsafe { &*self.ring.load(Ordering::Acquire) }
    }
}

impl<T> Drop for ChannelInner<T> {
    fn drop(&mut self) {
        // SAFETY: the current ring was created by Box::into_raw.
        drop(unsafe { Box::from_raw(*self.ring.get_mut()) });
    }
}

impl<T> Channel<T> {
    /// Creates a new channel with the given configuration.
    pub fn new(config: Config) -> Self {
        let ring = Box::into_raw(Box::new(Ring::new(&config, 0)));
        Self {
            inner: Arc::new(ChannelInner {
                ring: AtomicPtr::new(ring),
                lock: SpinLock::new(),
                retired: UnsafeCell::new(Vec::new()),
                producer_claimed: AtomicBool::new(false),
                consumer_claimed: AtomicBool::new(false),
                config,
                metrics: Metrics::new(),
            }),
        }
    }

    /// Creates a channel whose segments hold `capacity` slots (rounded up to
    /// a power of two).
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(Config::with_capacity(capacity))
    }

    /// Claims the producer side. Fails while another `Producer` is alive.
    pub fn producer(&self) -> Result<Producer<T>, ChannelError> {
        if self.inner.producer_claimed.swap(true, Ordering::Acquire) {
            return Err(ChannelError::ProducerClaimed);
        }
        Ok(Producer {
            channel: Arc::clone(&self.inner),
            _not_sync: PhantomData,
        })
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

    /// True iff the reader is on the writer segment and has caught up.
    pub fn is_empty(&self) -> bool {
        self.inner.ring().is_empty()
    }

    /// Number of unread values. Diagnostic, not wait-free.
    pub fn count(&self) -> usize {
        self.inner.ring().count()
    }

    /// Segments currently linked into the ring.
    pub fn segment_count(&self) -> usize {
        self.inner.ring().segment_count()
    }

    /// Replaces the ring with a fresh one.
    ///
    /// Call only while no `write`/`try_read` is in flight. Values written
    /// concurrently with `clear` may be lost, but memory stays valid: the
    /// old ring is kept until the channel is dropped.
    pub fn clear(&self) {
        let inner = &*self.inner;
        let _guard = inner.lock.lock();

        let fresh = Box::into_raw(Box::new(Ring::new(&inner.config, 0)));
        let old = inner.ring.swap(fresh, Ordering::AcqRel);
        // SAFETY: we hold the lock; `old` came from Box::into_raw and is no
        // longer reachable through `ring`.
        let old = unsafe { Box::from_raw(old) };

        tracing::debug!("cleared one-producer channel");
        if inner.config.enable_metrics {
            inner.metrics.absorb(&old.metrics());
            inner.metrics.add_clear();
        }
        // SAFETY: we hold the lock.
        unsafe { (*inner.retired.get()).push(old) };
    }

    /// Returns the channel configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Snapshot of the metrics, all zero unless enabled in the config.
    pub fn metrics(&self) -> MetricsSnapshot {
        let mut snapshot = self.inner.ring().metrics();
        if self.inner.config.enable_metrics {
            snapshot.merge(&self.inner.metrics.snapshot());
        }
        snapshot
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

/// The producer handle. `Send`, not `Sync`, not `Clone`.
pub struct Producer<T> {
    channel: Arc<ChannelInner<T>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T> Producer<T> {
    /// Appends a value. Never fails; may allocate a segment when the
    /// consumer lags.
    #[inline]
    pub fn write(&self, value: T) {
        // SAFETY: this handle is the channel's only producer and is not Sync.
        unsafe { self.channel.ring().push(value) }
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.channel.producer_claimed.store(false, Ordering::Release);
    }
}

/// The consumer handle. `Send`, not `Sync`, not `Clone`.
pub struct Consumer<T> {
    channel: Arc<ChannelInner<T>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T> Consumer<T> {
    /// Takes the next value, or `None` if nothing is ready.
    #[inline]
    pub fn try_read(&self) -> Option<T> {
        // SAFETY: this handle is the channel's only consumer and is not Sync.
        unsafe { self.channel.ring().pop() }
    }

    /// See [`Channel::is_empty`].
    pub fn is_empty(&self) -> bool {
        self.channel.ring().is_empty()
    }

    /// See [`Channel::count`].
    pub fn count(&self) -> usize {
        self.channel.ring().count()
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        self.channel.consumer_claimed.store(false, Ordering::Release);
    }
}
