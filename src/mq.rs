//! Single priority-class message queue.
//!
//! Each queue is an ordered FIFO of wrapper tokens behind its own lock.
//! Critical sections are insert/remove only; no lock is ever held across a
//! handler invocation.

use crate::pool::MsgRef;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Thread-safe FIFO of message wrappers with a head-insert escape hatch.
pub struct MessageQueue {
    items: Mutex<VecDeque<MsgRef>>,
}

impl MessageQueue {
    /// Create an empty queue with storage for `capacity` wrappers, so
    /// steady-state put/get never allocates.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append a wrapper at the tail.
    pub fn put(&self, wrapper: MsgRef) {
        self.items.lock().push_back(wrapper);
    }

    /// Insert a wrapper at the head, ahead of everything already queued.
    /// Used to requeue urgent items; creates the one LIFO exception to the
    /// queue's FIFO order.
    pub fn put_front(&self, wrapper: MsgRef) {
        self.items.lock().push_front(wrapper);
    }

    /// Unlink and return the head wrapper, or `None` when empty.
    pub fn get(&self) -> Option<MsgRef> {
        self.items.lock().pop_front()
    }

    /// Non-blocking emptiness probe for the dispatcher's scan.
    ///
    /// The result may be stale by the time [`get`](Self::get) runs; the scan
    /// relies only on eventual drain, so `get` returning `None` after
    /// `is_empty` returned false is a valid outcome ("try again next pass").
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}
