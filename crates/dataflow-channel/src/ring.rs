use crate::invariants::debug_assert_drained;
use crate::metrics::Metrics;
use crate::segment::Segment;
use crate::{Config, MetricsSnapshot};
use crossbeam_utils::CachePadded;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

// =============================================================================
// RING OF SEGMENTS
// =============================================================================
//
// One producer, one reader at a time. Segments form a singly linked chain
// starting at `head`; the last segment's `next` is null and the chain is read
// as a cycle (after the last segment comes `head` again). `head` never
// changes: new segments are always spliced in after the writer segment.
//
// **Producer:**
// 1. Append to `writer` (Relaxed load, only the producer stores it)
// 2. If full, pick the next target:
//    a. `writer.next` if set and not the reader's segment
//    b. `head` if `writer.next` is unset and `head` is not the reader's segment
//    c. otherwise allocate and splice in after `writer`
// 3. Put the value in slot 0 of the target, then store `writer` with Release
//
// **Reader:**
// 1. Load `writer` with Acquire, then consume from `reader`
// 2. Nothing consumed and `reader == writer`: the ring is empty
// 3. Nothing consumed and `reader != writer`: the producer left this segment
//    full, and the Acquire in step 1 guarantees we saw all of it. Move to
//    `next` (or `head`), store `reader` with Release, retry.
//
// The producer only reuses a segment it observes the reader is not on. The
// reader only leaves a segment after the producer has published a different
// writer segment, so it can never walk onto a segment the producer is in
// the middle of recycling.
//
// Growth is driven by consumer lag only. A reader that keeps pace caps the
// ring at its initial segments; segments are never freed while the ring lives.
//
// =============================================================================

/// Per-producer buffer: a cyclic chain of segments.
pub(crate) struct Ring<T> {
    // === PRODUCER HOT ===
    /// Segment currently appended to (written by producer, read by reader)
    writer: CachePadded<AtomicPtr<Segment<T>>>,

    // === CONSUMER HOT ===
    /// Segment currently drained (written by reader, read by producer)
    reader: CachePadded<AtomicPtr<Segment<T>>>,

    // === COLD STATE ===
    /// Oldest segment; fixed for the life of the ring
    head: *mut Segment<T>,
    segment_capacity: usize,
    segments: AtomicUsize,
    /// Registry id of the producer that owns this ring
    owner: usize,
    /// Next ring in the registry's traversal list, set before publication
    next: AtomicPtr<Ring<T>>,
    /// Held by the consumer currently draining this ring (MPMC)
    read_claim: AtomicBool,
    metrics: Metrics,
    enable_metrics: bool,
}

// Safety: Ring is Send + Sync as long as T is Send. The producer and reader
// roles are each held by one thread at a time, enforced by the channel handles.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    /// Creates a ring with `config.initial_segments` pre-linked segments.
    pub(crate) fn new(config: &Config, owner: usize) -> Self {
        let capacity = config.capacity();
        let head = Box::into_raw(Box::new(Segment::new(capacity)));

        let mut tail = head;
        for _ in 1..config.initial_segments {
            let seg = Box::into_raw(Box::new(Segment::new(capacity)));
            // SAFETY: tail is a live segment we just allocated and own.
            unsafe { (*tail).set_next(seg) };
            tail = seg;
        }

        Self {
            writer: CachePadded::new(AtomicPtr::new(head)),
            reader: CachePadded::new(AtomicPtr::new(head)),
            head,
            segment_capacity: capacity,
            segments: AtomicUsize::new(config.initial_segments),
            owner,
            next: AtomicPtr::new(ptr::null_mut()),
            read_claim: AtomicBool::new(false),
            metrics: Metrics::new(),
            enable_metrics: config.enable_metrics,
        }
    }

    // ---------------------------------------------------------------------
    // STATUS
    // ---------------------------------------------------------------------

    #[inline]
    pub(crate) fn owner(&self) -> usize {
        self.owner
    }

    /// Number of segments linked into this ring.
    #[inline]
    pub(crate) fn segment_count(&self) -> usize {
        self.segments.load(Ordering::Relaxed)
    }

    /// True iff the reader sits on the writer segment and has caught up.
    pub(crate) fn is_empty(&self) -> bool {
        let writer = self.writer.load(Ordering::Acquire);
        let reader = self.reader.load(Ordering::Acquire);
        // SAFETY: segments live as long as the ring.
        reader == writer && unsafe { (*reader).pending() } == 0
    }

    /// Unread values, walking from the reader segment to the writer segment.
    ///
    /// Not wait-free and only approximate under concurrent use.
    pub(crate) fn count(&self) -> usize {
        let writer = self.writer.load(Ordering::Acquire);
        let mut seg = self.reader.load(Ordering::Acquire);

        // SAFETY: segments live as long as the ring.
        unsafe {
            let mut count = (*seg).pending();
            // Bounded by the segment count in case the producer moves while
            // we walk.
            let mut budget = self.segment_count();
            while seg != writer && budget > 0 {
                seg = self.successor(seg);
                count += (*seg).pending();
                budget -= 1;
            }
            count
        }
    }

    pub(crate) fn metrics(&self) -> MetricsSnapshot {
        if self.enable_metrics {
            self.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        }
    }

    /// Segment after `seg` in the cyclic order.
    #[inline]
    unsafe fn successor(&self, seg: *mut Segment<T>) -> *mut Segment<T> {
        let next = (*seg).next();
        if next.is_null() {
            self.head
        } else {
            next
        }
    }

    // ---------------------------------------------------------------------
    // REGISTRY LINKS
    // ---------------------------------------------------------------------

    #[inline]
    pub(crate) fn next_ring(&self) -> *mut Ring<T> {
        self.next.load(Ordering::Acquire)
    }

    /// Must be called before the ring is published to other threads.
    pub(crate) fn link_next_ring(&self, next: *mut Ring<T>) {
        self.next.store(next, Ordering::Release);
    }

    /// Claims the read side for one consumer. Never waits.
    #[inline]
    pub(crate) fn try_claim_read(&self) -> bool {
        self.read_claim
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub(crate) fn release_read(&self) {
        self.read_claim.store(false, Ordering::Release);
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Appends `value`, moving to another segment when the current one is
    /// full. Never fails.
    ///
    /// # Safety
    ///
    /// Caller must be the ring's only producer.
    #[inline]
    pub(crate) unsafe fn push(&self, value: T) {
        let seg = self.writer.load(Ordering::Relaxed);
        if let Err(value) = (*seg).append(value) {
            self.advance_writer(seg, value);
        }

        if self.enable_metrics {
            self.metrics.add_messages_written(1);
        }
    }

    /// Slow path of `push`: recycle or allocate the next writer segment.
    #[cold]
    unsafe fn advance_writer(&self, seg: *mut Segment<T>, value: T) {
        debug_assert!((*seg).is_full());

        let next = (*seg).next();
        let reader = self.reader.load(Ordering::Acquire);

        let target = if !next.is_null() && next != reader {
            Some(next)
        } else if next.is_null() && self.head != reader {
            Some(self.head)
        } else {
            None
        };

        let target = match target {
            Some(target) => {
                debug_assert_drained!((*target).pending());
                (*target).restart_with(value);
                if self.enable_metrics {
                    self.metrics.add_segment_recycled();
                }
                target
            }
            None => {
                // The reader occupies the only candidate: grow by one segment.
                let fresh = Box::into_raw(Box::new(Segment::with_first(
                    self.segment_capacity,
                    value,
                )));
                (*fresh).set_next(next);
                (*seg).set_next(fresh);
                let total = self.segments.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::trace!(
                    owner = self.owner,
                    segments = total,
                    "consumer lagging, allocated segment"
                );
                if self.enable_metrics {
                    self.metrics.add_segment_allocated();
                }
                fresh
            }
        };

        // Publish last: the reader must never see the new writer segment
        // before its first value is committed.
        self.writer.store(target, Ordering::Release);
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Takes the oldest unread value, moving past segments the producer has
    /// finished with.
    ///
    /// # Safety
    ///
    /// Caller must hold the ring's read side exclusively.
    pub(crate) unsafe fn pop(&self) -> Option<T> {
        let mut seg = self.reader.load(Ordering::Relaxed);

        loop {
            let writer = self.writer.load(Ordering::Acquire);

            if let Some(value) = (*seg).consume() {
                if self.enable_metrics {
                    self.metrics.add_messages_read(1);
                }
                return Some(value);
            }

            if seg == writer {
                return None;
            }

            seg = self.successor(seg);
            self.reader.store(seg, Ordering::Release);
        }
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let mut seg = self.head;
        while !seg.is_null() {
            // SAFETY: every segment was created by Box::into_raw and is
            // reachable exactly once from head.
            let boxed = unsafe { Box::from_raw(seg) };
            seg = boxed.next();
        }
    }
}
