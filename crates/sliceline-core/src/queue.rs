//! Lock-free work queue for distributing input files across parallel workers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Pre-filled, closed queue of work items.
///
/// Workers call [`next()`](WorkQueue::next) to atomically claim the next item.
/// When a worker hits a fatal error it calls [`halt()`](WorkQueue::halt):
/// no further items are dispatched, but in-flight items run to completion
/// (soft cancellation — work items are idempotent to re-run).
pub struct WorkQueue<T> {
    items: Vec<T>,
    cursor: AtomicUsize,
    halted: AtomicBool,
}

impl<T> WorkQueue<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
            halted: AtomicBool::new(false),
        }
    }

    /// Claim the next item, or `None` when the queue is drained or halted.
    pub fn next(&self) -> Option<&T> {
        if self.halted.load(Ordering::Relaxed) {
            return None;
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i)
    }

    /// Stop dispatching new items.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Relaxed);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }

    /// Total items in queue
    pub fn total(&self) -> usize {
        self.items.len()
    }
}
