use crate::invariants::debug_assert_table_grows;
use crate::metrics::Metrics;
use crate::ring::Ring;
use crate::spin::SpinLock;
use crate::{Config, MetricsSnapshot};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

// =============================================================================
// PRODUCER REGISTRY
// =============================================================================
//
// Maps a producer id to its ring. Lookups are lock-free: load the current
// state, load its table, index with `id % size`, compare the owner id.
//
// The cold path (first write of a producer, table growth, clear) runs under
// `lock` and re-reads the current state once the lock is held, since
// another thread may have grown or replaced it in the meantime.
//
// Growth copies ring *pointers* into a larger table indexed directly by
// owner id, so a ring published once keeps its address forever. Replaced
// tables and states are never freed while the registry lives: a lock-free
// reader may still be looking at them. They are reclaimed on drop.
//
// Every ring of a state is also on the state's traversal list (`head` ->
// `Ring::next`), which is what consumers walk and what owns the rings.
//
// =============================================================================

/// Table of ring slots. A null slot is vacant.
struct Table<T> {
    slots: Box<[AtomicPtr<Ring<T>>]>,
}

impl<T> Table<T> {
    fn new(size: usize) -> Self {
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, || AtomicPtr::new(ptr::null_mut()));
        Self {
            slots: slots.into_boxed_slice(),
        }
    }

    #[inline]
    fn size(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn slot(&self, id: usize) -> &AtomicPtr<Ring<T>> {
        &self.slots[id % self.slots.len()]
    }
}

/// One generation of channel state. `clear()` swaps in a fresh one.
pub(crate) struct State<T> {
    table: AtomicPtr<Table<T>>,
    /// Tables replaced by growth. Guarded by the registry lock.
    retired_tables: UnsafeCell<Vec<Box<Table<T>>>>,
    /// Most recently registered ring; entry point of the traversal list
    head: AtomicPtr<Ring<T>>,
    /// Roaming cursor of the single consumer (one-consumer channels)
    reader: CachePadded<AtomicPtr<Ring<T>>>,
    epoch: u64,
}

impl<T> State<T> {
    fn new(size: usize, epoch: u64) -> Self {
        Self {
            table: AtomicPtr::new(Box::into_raw(Box::new(Table::new(size)))),
            retired_tables: UnsafeCell::new(Vec::new()),
            head: AtomicPtr::new(ptr::null_mut()),
            reader: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            epoch,
        }
    }

    #[inline]
    fn table(&self) -> &Table<T> {
        // SAFETY: tables are only freed when the state is dropped.
        unsafe { &*self.table.load(Ordering::Acquire) }
    }

    /// Identifies this generation; changes on every `clear()`.
    #[inline]
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    #[inline]
    pub(crate) fn head(&self) -> *mut Ring<T> {
        self.head.load(Ordering::Acquire)
    }

    /// Ring after `ring` on the traversal list, wrapping to `head`.
    ///
    /// # Safety
    ///
    /// `ring` must belong to this state.
    #[inline]
    pub(crate) unsafe fn successor(&self, ring: *mut Ring<T>) -> *mut Ring<T> {
        let next = (*ring).next_ring();
        if next.is_null() {
            self.head()
        } else {
            next
        }
    }

    /// Cursor of the single consumer.
    #[inline]
    pub(crate) fn reader(&self) -> *mut Ring<T> {
        self.reader.load(Ordering::Acquire)
    }

    /// Moves the single consumer's cursor.
    ///
    /// # Safety
    ///
    /// Caller must be the channel's only consumer.
    #[inline]
    pub(crate) unsafe fn set_reader(&self, ring: *mut Ring<T>) {
        self.reader.store(ring, Ordering::Release);
    }

    /// Iterates the rings registered in this state, newest first.
    pub(crate) fn rings(&self) -> Rings<'_, T> {
        Rings {
            cur: self.head(),
            _state: PhantomData,
        }
    }
}

impl<T> Drop for State<T> {
    fn drop(&mut self) {
        let mut ring = *self.head.get_mut();
        while !ring.is_null() {
            // SAFETY: rings are created by Box::into_raw and linked exactly
            // once into this list.
            let boxed = unsafe { Box::from_raw(ring) };
            ring = boxed.next_ring();
        }
        // SAFETY: the current table was created by Box::into_raw.
        drop(unsafe { Box::from_raw(*self.table.get_mut()) });
    }
}

/// Iterator over a state's traversal list.
pub(crate) struct Rings<'a, T> {
    cur: *mut Ring<T>,
    _state: PhantomData<&'a State<T>>,
}

impl<'a, T> Iterator for Rings<'a, T> {
    type Item = &'a Ring<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur.is_null() {
            return None;
        }
        // SAFETY: rings live as long as their state.
        let ring = unsafe { &*self.cur };
        self.cur = ring.next_ring();
        Some(ring)
    }
}

/// Producer-id to ring table with lock-free lookup and locked growth.
pub(crate) struct Registry<T> {
    state: AtomicPtr<State<T>>,
    /// Serializes registration, growth and clear. Never taken on the hot path.
    lock: SpinLock,
    /// States replaced by `clear()`. Guarded by `lock`.
    retired: UnsafeCell<Vec<Box<State<T>>>>,
    next_id: AtomicUsize,
    next_epoch: AtomicU64,
    config: Config,
    metrics: Metrics,
}

// Safety: the UnsafeCell fields are only touched while holding `lock`; rings
// hand values between threads under the segment protocol.
unsafe impl<T: Send> Send for Registry<T> {}
unsafe impl<T: Send> Sync for Registry<T> {}

impl<T> Registry<T> {
    pub(crate) fn new(config: Config) -> Self {
        Self {
            state: AtomicPtr::new(Box::into_raw(Box::new(State::new(
                config.registry_quantum,
                0,
            )))),
            lock: SpinLock::new(),
            retired: UnsafeCell::new(Vec::new()),
            next_id: AtomicUsize::new(0),
            next_epoch: AtomicU64::new(1),
            config,
            metrics: Metrics::new(),
        }
    }

    #[inline]
    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    /// Hands out a fresh producer id.
    pub(crate) fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// The current generation.
    #[inline]
    pub(crate) fn state(&self) -> &State<T> {
        // SAFETY: states are only freed when the registry is dropped.
        unsafe { &*self.state.load(Ordering::Acquire) }
    }

    /// Current table capacity.
    #[cfg(test)]
    fn size(&self) -> usize {
        self.state().table().size()
    }

    /// Returns the ring owned by `id`, registering it on first use.
    #[inline]
    pub(crate) fn resolve(&self, id: usize) -> &Ring<T> {
        let ring = self.state().table().slot(id).load(Ordering::Acquire);
        // SAFETY: published rings outlive the registry borrow.
        if !ring.is_null() && unsafe { (*ring).owner() } == id {
            return unsafe { &*ring };
        }
        self.setup(id)
    }

    /// Cold path of `resolve`: grow the table if needed and publish a ring.
    #[cold]
    fn setup(&self, id: usize) -> &Ring<T> {
        let _guard = self.lock.lock();
        let state = self.state();

        let mut table = state.table();
        let occupant = table.slot(id).load(Ordering::Relaxed);
        // SAFETY: non-null slots point at live rings.
        let occupant_id = if occupant.is_null() {
            0
        } else {
            unsafe { (*occupant).owner() }
        };

        if id.max(occupant_id) >= table.size() {
            // SAFETY: we hold the lock.
            table = unsafe { self.grow(state, id.max(occupant_id)) };
        }

        let slot = table.slot(id);
        let existing = slot.load(Ordering::Relaxed);
        if !existing.is_null() {
            // Ids below the table size map to their own slot, so an occupied
            // slot can only be ours.
            debug_assert_eq!(unsafe { (*existing).owner() }, id);
            return unsafe { &*existing };
        }

        let ring = Box::into_raw(Box::new(Ring::new(&self.config, id)));
        let head = state.head.load(Ordering::Relaxed);
        // SAFETY: the ring is not published yet.
        unsafe { (*ring).link_next_ring(head) };

        slot.store(ring, Ordering::Release);
        state.head.store(ring, Ordering::Release);
        if head.is_null() {
            // First ring: the single consumer starts here.
            state.reader.store(ring, Ordering::Release);
        }

        tracing::debug!(
            producer = id,
            table_size = table.size(),
            epoch = state.epoch,
            "registered producer ring"
        );
        if self.config.enable_metrics {
            self.metrics.add_registration();
        }

        // SAFETY: published rings live until the registry is dropped.
        unsafe { &*ring }
    }

    /// Replaces the state's table with a larger one indexed directly by
    /// owner id.
    ///
    /// # Safety
    ///
    /// Caller must hold `lock`.
    unsafe fn grow<'s>(&self, state: &'s State<T>, max_id: usize) -> &'s Table<T> {
        let old_ptr = state.table.load(Ordering::Relaxed);
        let old = &*old_ptr;

        let max = old
            .slots
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .filter(|ring| !ring.is_null())
            .map(|ring| (*ring).owner())
            .fold(max_id, usize::max);

        let quantum = self.config.registry_quantum;
        let size = (max / quantum + 1) * quantum * 2;
        debug_assert_table_grows!(old.size(), size);

        let fresh = Table::new(size);
        for slot in old.slots.iter() {
            let ring = slot.load(Ordering::Relaxed);
            if !ring.is_null() {
                fresh.slot((*ring).owner()).store(ring, Ordering::Relaxed);
            }
        }

        let fresh = Box::into_raw(Box::new(fresh));
        // Release publishes the copied slots together with the table.
        state.table.store(fresh, Ordering::Release);
        (*state.retired_tables.get()).push(Box::from_raw(old_ptr));

        tracing::debug!(
            old_size = old.size(),
            new_size = size,
            epoch = state.epoch,
            "grew producer registry"
        );
        if self.config.enable_metrics {
            self.metrics.add_registry_growth();
        }

        &*fresh
    }

    /// Swaps in an empty state of the same table size.
    ///
    /// Producers re-register on their next write; consumers notice the new
    /// epoch. The old state stays allocated until the registry is dropped,
    /// so a caller that breaks the quiescence contract loses values but
    /// never touches freed memory.
    pub(crate) fn clear(&self) {
        let _guard = self.lock.lock();
        let old_ptr = self.state.load(Ordering::Relaxed);
        // SAFETY: the current state is live.
        let size = unsafe { (*old_ptr).table().size() };
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);

        let fresh = Box::into_raw(Box::new(State::new(size, epoch)));
        self.state.store(fresh, Ordering::Release);
        // SAFETY: we hold the lock; old_ptr came from Box::into_raw and is no
        // longer reachable through `state`.
        let old = unsafe { Box::from_raw(old_ptr) };

        tracing::debug!(epoch, table_size = size, "cleared channel state");
        if self.config.enable_metrics {
            // Ring counters would vanish with the retired state.
            for ring in old.rings() {
                self.metrics.absorb(&ring.metrics());
            }
            self.metrics.add_clear();
        }
        // SAFETY: we hold the lock.
        unsafe { (*self.retired.get()).push(old) };
    }

    // ---------------------------------------------------------------------
    // DIAGNOSTICS
    // ---------------------------------------------------------------------

    pub(crate) fn producer_count(&self) -> usize {
        self.state().rings().count()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.state().rings().all(Ring::is_empty)
    }

    pub(crate) fn count(&self) -> usize {
        self.state().rings().map(Ring::count).sum()
    }

    /// Registry counters plus the counters of every ring in the current state.
    pub(crate) fn metrics(&self) -> MetricsSnapshot {
        let mut snapshot = if self.config.enable_metrics {
            self.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        };
        for ring in self.state().rings() {
            snapshot.merge(&ring.metrics());
        }
        snapshot
    }
}

impl<T> Drop for Registry<T> {
    fn drop(&mut self) {
        // SAFETY: the current state was created by Box::into_raw; retired
        // states drop with the Vec.
        drop(unsafe { Box::from_raw(*self.state.get_mut()) });
    }
}
