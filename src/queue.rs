//! Time-ordered in-memory queue shared by the dispatch and recheck workers.
//!
//! Items pop in ascending timestamp order; equal timestamps keep insertion
//! order. Pushing never blocks. Consumers wait on [`TimedQueue::changed`]
//! instead of polling.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use tokio::sync::Notify;

use crate::model::Timestamp;

struct Slot<T> {
    at: Timestamp,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Slot<T> {}

impl<T> PartialOrd for Slot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Slot<T> {
    // Reversed: BinaryHeap is a max-heap, we want the earliest on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct TimedQueue<T> {
    heap: Mutex<BinaryHeap<Slot<T>>>,
    seq: AtomicU64,
    notify: Notify,
}

impl<T> Default for TimedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimedQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Insert `item` keyed on `at` and wake the consumer.
    pub fn push(&self, at: Timestamp, item: T) {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.lock().push(Slot { at, seq, item });
        self.notify.notify_one();
    }

    /// Timestamp of the head, if any.
    pub fn peek_at(&self) -> Option<Timestamp> {
        self.lock().peek().map(|slot| slot.at)
    }

    /// Remove and return the head.
    pub fn pop(&self) -> Option<(Timestamp, T)> {
        self.lock().pop().map(|slot| (slot.at, slot.item))
    }

    /// Remove the head and every following item sharing its timestamp,
    /// provided the head is due (`at <= now`). Returns an empty vec otherwise.
    pub fn pop_due(&self, now: Timestamp) -> Vec<(Timestamp, T)> {
        let mut heap = self.lock();
        let Some(head_at) = heap.peek().map(|slot| slot.at) else {
            return Vec::new();
        };
        if head_at > now {
            return Vec::new();
        }

        let mut due = Vec::new();
        while heap.peek().is_some_and(|slot| slot.at == head_at) {
            if let Some(slot) = heap.pop() {
                due.push((slot.at, slot.item));
            }
        }
        due
    }

    /// Wait for the next push. A push made while nobody was waiting is
    /// remembered, so a consumer that checks the queue and then waits never
    /// misses it.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }

    /// Wait until the queue is non-empty, then pop the head.
    pub async fn pop_wait(&self) -> (Timestamp, T) {
        loop {
            if let Some(head) = self.pop() {
                return head;
            }
            self.changed().await;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BinaryHeap<Slot<T>>> {
        self.heap.lock().unwrap_or_else(|e| e.into_inner())
    }
}
