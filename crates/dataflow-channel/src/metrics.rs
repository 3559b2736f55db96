use std::sync::atomic::{AtomicU64, Ordering};

/// Optional counters for monitoring channel behaviour.
///
/// All updates are `Relaxed`; the values are diagnostics, not synchronization.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    messages_written: AtomicU64,
    messages_read: AtomicU64,
    segments_allocated: AtomicU64,
    segments_recycled: AtomicU64,
    registrations: AtomicU64,
    registry_growths: AtomicU64,
    clears: AtomicU64,
}

/// Point-in-time copy of a channel's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_written: u64,
    pub messages_read: u64,
    /// Segments allocated after ring construction (consumer lag).
    pub segments_allocated: u64,
    /// Drained segments reused as the next write target.
    pub segments_recycled: u64,
    pub registrations: u64,
    pub registry_growths: u64,
    pub clears: u64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_messages_written(&self, n: u64) {
        self.messages_written.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_messages_read(&self, n: u64) {
        self.messages_read.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_segment_allocated(&self) {
        self.segments_allocated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_segment_recycled(&self) {
        self.segments_recycled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_registry_growth(&self) {
        self.registry_growths.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_clear(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds the counters of a ring that is being retired, so its traffic
    /// stays visible after `clear()`.
    pub(crate) fn absorb(&self, retired: &MetricsSnapshot) {
        self.messages_written
            .fetch_add(retired.messages_written, Ordering::Relaxed);
        self.messages_read
            .fetch_add(retired.messages_read, Ordering::Relaxed);
        self.segments_allocated
            .fetch_add(retired.segments_allocated, Ordering::Relaxed);
        self.segments_recycled
            .fetch_add(retired.segments_recycled, Ordering::Relaxed);
        self.registrations
            .fetch_add(retired.registrations, Ordering::Relaxed);
        self.registry_growths
            .fetch_add(retired.registry_growths, Ordering::Relaxed);
        self.clears.fetch_add(retired.clears, Ordering::Relaxed);
    }

    /// Returns the current counter values.
    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_written: self.messages_written.load(Ordering::Relaxed),
            messages_read: self.messages_read.load(Ordering::Relaxed),
            segments_allocated: self.segments_allocated.load(Ordering::Relaxed),
            segments_recycled: self.segments_recycled.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            registry_growths: self.registry_growths.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Adds another snapshot's counters to this one.
    pub fn merge(&mut self, other: &MetricsSnapshot) {
        self.messages_written += other.messages_written;
        self.messages_read += other.messages_read;
        self.segments_allocated += other.segments_allocated;
        self.segments_recycled += other.segments_recycled;
        self.registrations += other.registrations;
        self.registry_growths += other.registry_growths;
        self.clears += other.clears;
    }
}
