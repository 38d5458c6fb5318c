//! Blocking FIFO queue shared between the device and network services.
//!
//! Both directions of traffic (inbound commands, outbound responses) flow
//! through one of these. Unbounded, strict FIFO, no deduplication or
//! priorities; a burst of producers never blocks.
//!
//! Shutdown is cooperative: `close()` wakes every blocked consumer and makes
//! `dequeue` return `None` from then on, so a consumer loop written as
//! `while let Some(msg) = queue.dequeue()` unwinds cleanly with all guards
//! released.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Thread-safe FIFO with blocking dequeue.
pub struct BlockingQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BlockingQueue<T> {
    /// Create an empty open queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append an item and wake one blocked consumer.
    ///
    /// Items enqueued after `close()` are dropped: by then every consumer
    /// is unwinding and anything still in flight is stale.
    pub fn enqueue(&self, item: T) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.items.push_back(item);
        drop(inner);
        self.available.notify_one();
    }

    /// Remove and return the head, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue has been closed.
    pub fn dequeue(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            self.available.wait(&mut inner);
        }
    }

    /// Close the queue and wake every blocked consumer.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        drop(inner);
        self.available.notify_all();
    }

    /// Snapshot of the current length.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Snapshot emptiness check.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
