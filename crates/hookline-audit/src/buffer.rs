//! Fixed-capacity ingestion buffer.
//!
//! Many producers (async handlers on lane workers) offer entries; a single
//! periodic consumer drains them. Offering never blocks: when the buffer is
//! full the new entry is dropped and counted.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::ArrayQueue;

/// Default number of entries held in memory.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Lock-free bounded FIFO with a drop-newest overflow policy.
pub struct IngestBuffer<T> {
    queue: ArrayQueue<T>,
    dropped: AtomicU64,
}

impl<T> IngestBuffer<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Capacities come from validated config.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append `item` unless the buffer is full. Returns whether it was kept.
    pub fn offer(&self, item: T) -> bool {
        match self.queue.push(item) {
            Ok(()) => true,
            Err(_rejected) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Remove up to `max` entries in arrival order. Never waits.
    pub fn drain_up_to(&self, max: usize) -> Vec<T> {
        let mut out = Vec::with_capacity(max.min(self.queue.len()));
        while out.len() < max {
            match self.queue.pop() {
                Some(item) => out.push(item),
                None => break,
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Entries rejected because the buffer was full, since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> std::fmt::Debug for IngestBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("dropped", &self.dropped())
            .finish()
    }
}
