//! Fixed-size message wrapper pool.
//!
//! All wrapper slots are allocated up front as an arena; the free list and the
//! priority queues carry slot indices rather than pointers, so the posting hot
//! path never touches the allocator. Pool exhaustion surfaces as a rejected
//! acquire, a deliberate backpressure point handled by producers.

use crate::message::SchedulerMessage;
use parking_lot::Mutex;

/// Default number of wrapper slots, sized for the busiest bring-up bursts.
pub const DEFAULT_POOL_DEPTH: usize = 1024;

/// Handle to a slot currently in circulation.
///
/// Deliberately neither `Copy` nor `Clone`: a `MsgRef` lives on the free list,
/// on exactly one queue, or with the dispatcher thread mid-processing, and the
/// move-only token makes a second owner unrepresentable.
#[derive(Debug, PartialEq, Eq)]
pub struct MsgRef(usize);

struct PoolInner {
    slots: Vec<Option<SchedulerMessage>>,
    free: Vec<usize>,
}

/// Bounded arena of message slots with O(1) acquire/release.
pub struct MessagePool {
    inner: Mutex<PoolInner>,
    depth: usize,
}

impl MessagePool {
    /// Pre-allocate `depth` slots and link them all onto the free list.
    pub fn new(depth: usize) -> Self {
        let mut slots = Vec::with_capacity(depth);
        slots.resize_with(depth, || None);
        // Hand out low indices first.
        let free: Vec<usize> = (0..depth).rev().collect();
        Self {
            inner: Mutex::new(PoolInner { slots, free }),
            depth,
        }
    }

    /// Move `msg` into a free slot.
    ///
    /// Returns the message unchanged when the pool is exhausted so the caller
    /// can run its discard path.
    pub fn acquire(&self, msg: SchedulerMessage) -> Result<MsgRef, SchedulerMessage> {
        let mut inner = self.inner.lock();
        match inner.free.pop() {
            Some(idx) => {
                debug_assert!(inner.slots[idx].is_none());
                inner.slots[idx] = Some(msg);
                Ok(MsgRef(idx))
            }
            None => Err(msg),
        }
    }

    /// Move the message out of an in-circulation slot.
    ///
    /// Panics if the slot is empty; an empty slot behind a live `MsgRef` means
    /// the single-ownership invariant was broken, which is a programming
    /// error, not a runtime condition.
    pub fn take(&self, wrapper: &MsgRef) -> SchedulerMessage {
        let mut inner = self.inner.lock();
        inner.slots[wrapper.0]
            .take()
            .expect("pool slot empty behind a live wrapper")
    }

    /// Return a wrapper to the free list, dropping any message left in it.
    pub fn release(&self, wrapper: MsgRef) {
        let mut inner = self.inner.lock();
        inner.slots[wrapper.0] = None;
        inner.free.push(wrapper.0);
    }

    /// Number of wrappers currently on the free list.
    pub fn free_len(&self) -> usize {
        self.inner.lock().free.len()
    }

    /// Total number of slots in the arena.
    pub fn depth(&self) -> usize {
        self.depth
    }
}
