//! Registration lock: a tagged atomic flag taken with compare-and-swap.
//!
//! Only the cold paths (producer registration, registry growth, `clear`)
//! take this lock. Writers and readers of already published rings never
//! touch it.

use std::hint;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// Adaptive backoff for lock contention (Crossbeam-style).
///
/// Spins with PAUSE hints first, then yields to the OS on every retry.
/// Unlike a bounded backoff it never gives up: the lock holder always
/// finishes in O(table size).
#[derive(Debug, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6; // 2^6 = 64 spins max before yielding

    /// Creates a new backoff instance.
    #[inline]
    pub fn new() -> Self {
        Self { step: 0 }
    }

    /// Spin while young, yield to the scheduler afterwards.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..1u32 << self.step {
                hint::spin_loop();
            }
            self.step += 1;
        } else {
            thread::yield_now();
        }
    }

    /// True once the backoff has moved on from spinning to yielding.
    #[inline]
    pub fn is_yielding(&self) -> bool {
        self.step > Self::SPIN_LIMIT
    }

    /// Reset for next wait cycle.
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

/// Mutual exclusion flag, 0 = free, 1 = held.
#[derive(Debug, Default)]
pub(crate) struct SpinLock {
    state: AtomicU32,
}

impl SpinLock {
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
        }
    }

    /// Busy-retry CAS from 0 to 1 until it succeeds.
    pub(crate) fn lock(&self) -> SpinGuard<'_> {
        let mut backoff = Backoff::new();
        loop {
            if self
                .state
                .compare_exchange_weak(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return SpinGuard { lock: self };
            }
            // Wait on a plain load so contended cores do not bounce the line.
            while self.state.load(Ordering::Relaxed) == LOCKED {
                backoff.snooze();
            }
        }
    }

    #[cfg(test)]
    fn try_lock(&self) -> Option<SpinGuard<'_>> {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinGuard { lock: self })
    }

    #[cfg(test)]
    fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) == LOCKED
    }
}

/// Releases the lock on drop.
pub(crate) struct SpinGuard<'a> {
    lock: &'a SpinLock,
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.lock.state.store(UNLOCKED, Ordering::Release);
    }
}
