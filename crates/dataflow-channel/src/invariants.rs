//! Debug assertion macros for segment and registry invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`), so there is
//! zero overhead in release builds.
//!
//! Used by `Segment<T>`, `Ring<T>` and `Registry<T>`.

// =============================================================================
// Segment cursors
// =============================================================================

/// Assert the cursor ordering of a segment.
///
/// **Invariant**: `reader ≤ writer ≤ capacity`
///
/// Used in: `Segment::append()`, `Segment::consume()`
macro_rules! debug_assert_cursor_bounds {
    ($reader:expr, $writer:expr, $capacity:expr) => {
        debug_assert!(
            $reader <= $writer && $writer <= $capacity,
            "segment cursors out of order: reader {} writer {} capacity {}",
            $reader,
            $writer,
            $capacity
        )
    };
}

/// Assert that a cursor only moves forward between two recycling events.
///
/// Used in: `Segment::append()` for the writer, `Segment::consume()` for the reader
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new > $old,
            "{} cursor did not advance: {} -> {}",
            $name,
            $old,
            $new
        )
    };
}

/// Assert that a read targets a committed slot.
///
/// **Invariant**: slot `i` is initialized ⟺ `reader ≤ i < writer`
///
/// Used in: `Segment::consume()` before `assume_init_read()`
macro_rules! debug_assert_committed_read {
    ($pos:expr, $writer:expr) => {
        debug_assert!(
            $pos < $writer,
            "reading slot {} outside committed range [.., {})",
            $pos,
            $writer
        )
    };
}

// =============================================================================
// Recycling
// =============================================================================

/// Assert that a segment chosen for reuse holds no unread values.
///
/// Used in: `Ring::advance_writer()` before resetting a recycled segment
macro_rules! debug_assert_drained {
    ($pending:expr) => {
        debug_assert!(
            $pending == 0,
            "recycling a segment with {} unread values",
            $pending
        )
    };
}

// =============================================================================
// Registry
// =============================================================================

/// Assert that the registry table only grows.
///
/// Used in: `Registry::grow()` before publishing the new table
macro_rules! debug_assert_table_grows {
    ($old:expr, $new:expr) => {
        debug_assert!(
            $new > $old,
            "registry table shrank from {} to {} slots",
            $old,
            $new
        )
    };
}

pub(crate) use debug_assert_committed_read;
pub(crate) use debug_assert_cursor_bounds;
pub(crate) use debug_assert_drained;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_table_grows;
