use crate::invariants::{
    debug_assert_committed_read, debug_assert_cursor_bounds, debug_assert_monotonic,
};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

// =============================================================================
// SEGMENT PROTOCOL
// =============================================================================
//
// A segment is a fixed array of slots with two cursors:
//
// - `writer_position`: number of committed slots. Stored only by the owning
//   producer, with Release, after the slot write. A reader that Acquire-loads
//   a position `p` therefore sees every value in `[0, p)` fully written.
// - `reader_position`: number of consumed slots. Stored only by the reader
//   that currently holds the ring's read side.
//
// Invariant: `reader_position <= writer_position <= capacity`.
//
// The two cursors live on separate cache lines so the producer and the
// consumer never invalidate each other's line on the hot path.
//
// Recycling (`restart_with`) rewrites both cursors from the producer side.
// This is only legal while the reader is provably elsewhere, which the
// ring guarantees before calling it (see `Ring::advance_writer`).
//
// =============================================================================

/// Fixed-capacity slot array with independent reader/writer cursors.
pub(crate) struct Segment<T> {
    writer_position: CachePadded<AtomicUsize>,
    reader_position: CachePadded<AtomicUsize>,
    /// Successor in the ring. Written by the producer only.
    next: AtomicPtr<Segment<T>>,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// Safety: slots are handed from exactly one writer to exactly one reader and
// every hand-off is ordered by the Release/Acquire pair on writer_position.
unsafe impl<T: Send> Send for Segment<T> {}
unsafe impl<T: Send> Sync for Segment<T> {}

impl<T> Segment<T> {
    /// Allocates an empty segment with `capacity` slots.
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "segment capacity must be non-zero");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || UnsafeCell::new(MaybeUninit::uninit()));

        Self {
            writer_position: CachePadded::new(AtomicUsize::new(0)),
            reader_position: CachePadded::new(AtomicUsize::new(0)),
            next: AtomicPtr::new(ptr::null_mut()),
            slots: slots.into_boxed_slice(),
        }
    }

    /// Allocates a segment whose slot 0 already holds `value`.
    pub(crate) fn with_first(capacity: usize, value: T) -> Self {
        let segment = Self::new(capacity);
        // SAFETY: the segment is not shared yet.
        unsafe {
            (*segment.slots[0].get()).write(value);
        }
        segment.writer_position.store(1, Ordering::Relaxed);
        segment
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn next(&self) -> *mut Segment<T> {
        self.next.load(Ordering::Acquire)
    }

    /// Links `next` after this segment.
    ///
    /// # Safety
    ///
    /// Caller must be the ring's producer.
    #[inline]
    pub(crate) unsafe fn set_next(&self, next: *mut Segment<T>) {
        self.next.store(next, Ordering::Release);
    }

    /// Committed slot count as seen by the reader.
    #[inline]
    pub(crate) fn written(&self) -> usize {
        self.writer_position.load(Ordering::Acquire)
    }

    /// Number of committed but unread values. Diagnostic only.
    #[inline]
    pub(crate) fn pending(&self) -> usize {
        let reader = self.reader_position.load(Ordering::Acquire);
        self.written().saturating_sub(reader)
    }

    /// Returns true if the writer has used every slot.
    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.writer_position.load(Ordering::Relaxed) == self.capacity()
    }

    /// Stores `value` in the next free slot, handing it back if the segment
    /// is full.
    ///
    /// # Safety
    ///
    /// Caller must be the only producer of this segment.
    #[inline]
    pub(crate) unsafe fn append(&self, value: T) -> Result<(), T> {
        let pos = self.writer_position.load(Ordering::Relaxed);
        if pos == self.capacity() {
            return Err(value);
        }

        debug_assert_cursor_bounds!(
            self.reader_position.load(Ordering::Relaxed),
            pos,
            self.capacity()
        );

        // SAFETY: slot `pos` is beyond writer_position, so the reader does not
        // touch it until the Release store below publishes it.
        (*self.slots[pos].get()).write(value);

        let new_pos = pos.wrapping_add(1);
        debug_assert_monotonic!("writer", pos, new_pos);
        self.writer_position.store(new_pos, Ordering::Release);
        Ok(())
    }

    /// Takes the oldest unread value, or `None` if the reader has caught up
    /// with the writer. Caught up is not the same as full: the segment may
    /// still be the producer's active target.
    ///
    /// # Safety
    ///
    /// Caller must be the only reader of this segment.
    #[inline]
    pub(crate) unsafe fn consume(&self) -> Option<T> {
        let pos = self.reader_position.load(Ordering::Relaxed);
        let writer = self.writer_position.load(Ordering::Acquire);
        if pos == writer {
            return None;
        }

        debug_assert_cursor_bounds!(pos, writer, self.capacity());
        debug_assert_committed_read!(pos, writer);

        // SAFETY: the Acquire load above synchronizes with the producer's
        // Release store, so slot `pos` is fully written. Moving the value out
        // leaves the slot logically uninitialized.
        let value = (*self.slots[pos].get()).assume_init_read();

        let new_pos = pos.wrapping_add(1);
        debug_assert_monotonic!("reader", pos, new_pos);
        self.reader_position.store(new_pos, Ordering::Release);
        Some(value)
    }

    /// Reuses a drained segment: `value` goes to slot 0 and both cursors
    /// restart, with the writer at 1.
    ///
    /// # Safety
    ///
    /// Caller must be the ring's producer, and the ring's reader must not be
    /// positioned on this segment.
    pub(crate) unsafe fn restart_with(&self, value: T) {
        (*self.slots[0].get()).write(value);
        self.reader_position.store(0, Ordering::Relaxed);
        self.writer_position.store(1, Ordering::Release);
    }
}

impl<T> Drop for Segment<T> {
    fn drop(&mut self) {
        // Drop every value that was committed but never read.
        let reader = *self.reader_position.get_mut();
        let writer = *self.writer_position.get_mut();

        for slot in &mut self.slots[reader..writer] {
            // SAFETY: slots in [reader, writer) are initialized.
            unsafe {
                ptr::drop_in_place(slot.get_mut().as_mut_ptr());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_append_until_full() {
        let seg = Segment::<u64>::new(4);
        unsafe {
            for i in 0..4 {
                assert!(seg.append(i).is_ok());
            }
            assert!(seg.is_full());
            assert_eq!(seg.append(99), Err(99));
        }
        assert_eq!(seg.written(), 4);
        assert_eq!(seg.pending(), 4);
    }

    #[test]
    fn test_consume_in_order() {
        let seg = Segment::<u64>::new(8);
        unsafe {
            assert_eq!(seg.consume(), None);
            seg.append(1).unwrap();
            seg.append(2).unwrap();
            assert_eq!(seg.consume(), Some(1));
            seg.append(3).unwrap();
            assert_eq!(seg.consume(), Some(2));
            assert_eq!(seg.consume(), Some(3));
            assert_eq!(seg.consume(), None);
        }
        assert_eq!(seg.pending(), 0);
    }

    #[test]
    fn test_with_first_and_restart() {
        let seg = Segment::with_first(2, 10u32);
        assert_eq!(seg.written(), 1);
        unsafe {
            seg.append(20).unwrap();
            assert_eq!(seg.consume(), Some(10));
            assert_eq!(seg.consume(), Some(20));

            seg.restart_with(30);
            assert_eq!(seg.written(), 1);
            assert_eq!(seg.pending(), 1);
            assert_eq!(seg.consume(), Some(30));
        }
    }

    #[test]
    fn test_drop_releases_unread_values() {
        static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

        struct DropTracker;

        impl Drop for DropTracker {
            fn drop(&mut self) {
                DROP_COUNT.fetch_add(1, Ordering::SeqCst);
            }
        }

        DROP_COUNT.store(0, Ordering::SeqCst);
        {
            let seg = Segment::new(8);
            unsafe {
                for _ in 0..5 {
                    assert!(seg.append(DropTracker).is_ok());
                }
                // Two consumed and dropped right away.
                drop(seg.consume());
                drop(seg.consume());
            }
            assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 2);
        }
        // The remaining three go with the segment.
        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 5);
    }
}
