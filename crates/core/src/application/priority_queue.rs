// Priority Queue - hand-off point between drivers (producers) and pollers (consumers)
//
// Min-heap on priority, FIFO among equal priorities. Two semaphores track
// ready items and free slots so that both sides can block without callers
// holding any lock.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::domain::Priority;
use crate::port::QueuedJob;

/// Queue of ready jobs shared by every driver and poller
pub type JobQueue = PriorityQueue<Box<dyn QueuedJob>>;

/// Anything carrying a priority can be queued
pub trait Prioritized {
    fn priority(&self) -> Priority;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("priority queue is full (capacity {0})")]
    Full(usize),

    #[error("priority queue is closed")]
    Closed,
}

struct Entry<T> {
    priority: Priority,
    seq: u64,
    item: T,
}

// Reverse ordering for min-heap behavior; lower seq wins ties
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

struct Heap<T> {
    entries: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

/// A free slot held for one item. Dropping it unused gives the slot back.
pub struct Reservation<'a, T: Prioritized> {
    queue: &'a PriorityQueue<T>,
    slot: SemaphorePermit<'a>,
}

impl<T: Prioritized> Reservation<'_, T> {
    pub fn insert(self, item: T) {
        self.slot.forget();
        self.queue.push(item);
    }
}

/// Bounded, thread-safe min-priority queue
pub struct PriorityQueue<T> {
    heap: Mutex<Heap<T>>,
    /// One permit per item in the heap
    ready: Semaphore,
    /// One permit per free slot
    free: Semaphore,
    capacity: usize,
}

impl<T: Prioritized> PriorityQueue<T> {
    /// Create a queue holding at most `capacity` items (0 = as many as the semaphore allows)
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            Semaphore::MAX_PERMITS
        } else {
            capacity.min(Semaphore::MAX_PERMITS)
        };

        Self {
            heap: Mutex::new(Heap {
                entries: BinaryHeap::new(),
                next_seq: 0,
            }),
            ready: Semaphore::new(0),
            free: Semaphore::new(capacity),
            capacity,
        }
    }

    /// Insert an item, waiting for a free slot when the queue is at capacity
    pub async fn insert(&self, item: T) -> Result<(), QueueError> {
        self.reserve().await?.insert(item);
        Ok(())
    }

    /// Wait for a free slot without committing an item to it yet
    pub async fn reserve(&self) -> Result<Reservation<'_, T>, QueueError> {
        let slot = self.free.acquire().await.map_err(|_| QueueError::Closed)?;
        Ok(Reservation { queue: self, slot })
    }

    /// Insert without waiting; the item is handed back when it cannot be queued
    pub fn try_insert(&self, item: T) -> Result<(), (QueueError, T)> {
        match self.free.try_acquire() {
            Ok(slot) => {
                slot.forget();
                self.push(item);
                Ok(())
            }
            Err(tokio::sync::TryAcquireError::NoPermits) => {
                Err((QueueError::Full(self.capacity), item))
            }
            Err(tokio::sync::TryAcquireError::Closed) => Err((QueueError::Closed, item)),
        }
    }

    /// Remove and return the item with the lowest priority value, waiting
    /// until one is available.
    ///
    /// Returns `None` once the queue is closed. Cancel-safe: a dropped call
    /// never consumes an item.
    pub async fn extract_min(&self) -> Option<T> {
        loop {
            let ready = self.ready.acquire().await.ok()?;
            ready.forget();

            let entry = self.heap.lock().entries.pop();
            if let Some(entry) = entry {
                self.free.add_permits(1);
                return Some(entry.item);
            }
        }
    }

    /// Stop accepting inserts and wake every waiting consumer with `None`
    pub fn close(&self) {
        self.free.close();
        self.ready.close();
    }

    pub fn is_closed(&self) -> bool {
        self.ready.is_closed()
    }

    pub fn len(&self) -> usize {
        self.heap.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn push(&self, item: T) {
        {
            let mut heap = self.heap.lock();
            let seq = heap.next_seq;
            heap.next_seq += 1;
            heap.entries.push(Entry {
                priority: item.priority(),
                seq,
                item,
            });
        }
        self.ready.add_permits(1);
    }
}
