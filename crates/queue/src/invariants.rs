//! Debug assertion macros for `Queue<T>` invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`) — zero overhead
//! in release builds, mirroring the convention used across this workspace.

/// Assert that a value inserted by `push_sorted` lands between its
/// neighbours in ascending key order.
///
/// **Invariant**: after `push_sorted`, for the inserted index `i`,
/// `key(i-1) <= key(i) <= key(i+1)` (where present).
macro_rules! debug_assert_sorted_neighbours {
    ($prev:expr, $key:expr, $next:expr) => {
        if let Some(p) = $prev {
            debug_assert!(p <= $key, "queue push_sorted broke ascending order on the left");
        }
        if let Some(n) = $next {
            debug_assert!($key <= n, "queue push_sorted broke ascending order on the right");
        }
    };
}

/// Assert that a draining operation leaves the internal deque empty.
macro_rules! debug_assert_drained {
    ($len:expr) => {
        debug_assert_eq!($len, 0, "queue drain left items behind")
    };
}

pub(crate) use debug_assert_drained;
pub(crate) use debug_assert_sorted_neighbours;
