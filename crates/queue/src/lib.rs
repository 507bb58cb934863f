//! An explicit, owned FIFO queue with head-splice and sorted-reinsertion.
//!
//! This replaces the intrusive `next`-pointer linked list and raw
//! mutex/condvar pair that the original C implementation builds by hand
//! (`fc_queue`) for every producer/consumer relationship in the system. A
//! single generic `Queue<T>` backs both the binlog writer's producer→writer
//! queue and the receipt channel's pending/`waiting_resp` queues.
//!
//! Three shapes of insertion are supported, each grounded on a distinct call
//! site in the original:
//!
//! - [`Queue::push_back`] — ordinary submission (`fc_queue_push`).
//! - [`Queue::push_front_list`] — splice an already-ordered batch onto the
//!   head in one lock acquisition (`fc_queue_push_queue_to_head_ex`), used
//!   for reconnect replay and for the repush of a batch's unsent tail.
//! - [`Queue::push_sorted`] — insertion-sort a single item by key
//!   (`repush_to_queue`'s head/tail fast paths plus linear scan fallback),
//!   used by version-ordered repush.
//!
//! Draining comes in a blocking and a non-blocking flavor
//! ([`Queue::pop_all`], [`Queue::try_pop_all`]), plus a cooperative
//! [`Queue::terminate`] that wakes every blocked popper without requiring
//! new work to arrive.

mod invariants;

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use invariants::{debug_assert_drained, debug_assert_sorted_neighbours};

struct Inner<T> {
    items: VecDeque<T>,
    terminated: bool,
}

/// A multi-producer, single-consumer FIFO with head-splice and
/// sorted-insertion support, guarded by a plain mutex + condvar.
///
/// Concurrency is handled the boring way on purpose: every operation takes
/// the lock for the duration of a `VecDeque` mutation and releases it before
/// the caller does anything else (in particular, before any I/O). The
/// consumer side is expected to call [`Queue::pop_all`] or
/// [`Queue::try_pop_all`] to detach the whole backlog at once and then work
/// on the detached `Vec` without holding the lock.
pub struct Queue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    /// Creates an empty, non-terminated queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                terminated: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Appends a single item to the tail and wakes one blocked popper.
    pub fn push_back(&self, item: T) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.push_back(item);
        self.not_empty.notify_one();
    }

    /// Splices an already-ordered batch onto the head in one lock
    /// acquisition, preserving the batch's internal order.
    ///
    /// `items` is consumed front-to-back and the whole block ends up ahead
    /// of whatever was already queued, matching
    /// `fc_queue_push_queue_to_head_ex`.
    pub fn push_front_list<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: DoubleEndedIterator,
    {
        let mut inner = self.inner.lock().unwrap();
        for item in items.into_iter().rev() {
            inner.items.push_front(item);
        }
        self.not_empty.notify_one();
    }

    /// Inserts `item` preserving ascending order of `key_fn(item)`.
    ///
    /// Mirrors `repush_to_queue`'s three cases: empty queue, new head, new
    /// tail, or a linear scan from the head to find the insertion point.
    pub fn push_sorted<K, F>(&self, item: T, key_fn: F)
    where
        K: Ord + Copy,
        F: Fn(&T) -> K,
    {
        let mut inner = self.inner.lock().unwrap();
        let key = key_fn(&item);

        let insert_at = if inner.items.is_empty() {
            0
        } else if key <= key_fn(&inner.items[0]) {
            0
        } else if key > key_fn(&inner.items[inner.items.len() - 1]) {
            inner.items.len()
        } else {
            let mut idx = 1;
            while idx < inner.items.len() && key_fn(&inner.items[idx]) < key {
                idx += 1;
            }
            idx
        };

        let prev_key = if insert_at > 0 {
            Some(key_fn(&inner.items[insert_at - 1]))
        } else {
            None
        };
        let next_key = inner.items.get(insert_at).map(&key_fn);
        debug_assert_sorted_neighbours!(prev_key, key, next_key);

        inner.items.insert(insert_at, item);
        self.not_empty.notify_one();
    }

    /// Blocks until the queue is non-empty or [`Queue::terminate`] has been
    /// called, then detaches and returns everything currently queued.
    ///
    /// Returns an empty `Vec` if the queue was terminated while empty.
    #[must_use]
    pub fn pop_all(&self) -> Vec<T> {
        let mut inner = self.inner.lock().unwrap();
        while inner.items.is_empty() && !inner.terminated {
            inner = self.not_empty.wait(inner).unwrap();
        }
        let drained: Vec<T> = inner.items.drain(..).collect();
        debug_assert_drained!(inner.items.len());
        drained
    }

    /// Detaches and returns everything currently queued without blocking.
    #[must_use]
    pub fn try_pop_all(&self) -> Vec<T> {
        let mut inner = self.inner.lock().unwrap();
        let drained: Vec<T> = inner.items.drain(..).collect();
        debug_assert_drained!(inner.items.len());
        drained
    }

    /// Cooperative stop token: wakes every blocked [`Queue::pop_all`] caller.
    /// Already-queued items are left in place for a final `try_pop_all`.
    pub fn terminate(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.terminated = true;
        self.not_empty.notify_all();
    }

    /// Whether [`Queue::terminate`] has been called.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.lock().unwrap().terminated
    }
}
