//! Event primitives used by the dispatch loop.
//!
//! [`Event`] is a manual-reset boolean latch for start/resume/shutdown
//! handshakes. [`EventFlags`] is the dispatcher's wake-up bitmask: producers
//! raise bits and notify, the dispatcher sleeps until an interesting bit is
//! visible. With `parking_lot` the waits cannot return spuriously failed, so
//! the "wait primitive failed" class of programming error is unrepresentable
//! here.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Manual-reset boolean latch.
pub struct Event {
    state: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Latch the event and wake all waiters.
    pub fn set(&self) {
        let mut state = self.state.lock();
        *state = true;
        self.cond.notify_all();
    }

    /// Clear the latch. Waiters arriving afterwards block until the next set.
    pub fn reset(&self) {
        *self.state.lock() = false;
    }

    /// Block until the event is set.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while !*state {
            self.cond.wait(&mut state);
        }
    }

    /// Block until the event is set or `timeout` elapses. Returns whether the
    /// event was set. Used by tests and defensive callers; the dispatch loop
    /// itself always waits unbounded.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !*state {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return *state;
            }
        }
        true
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

/// Wake-up reason bits shared between producers and the dispatcher.
pub struct EventFlags {
    bits: Mutex<u32>,
    cond: Condvar,
}

impl EventFlags {
    /// A message was posted.
    pub const POST: u32 = 1 << 0;
    /// An external caller requested the loop park itself.
    pub const SUSPEND: u32 = 1 << 1;
    /// The loop must drain out and terminate.
    pub const SHUTDOWN: u32 = 1 << 2;

    pub fn new() -> Self {
        Self {
            bits: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    /// Raise `mask` and wake the dispatcher.
    pub fn raise(&self, mask: u32) {
        let mut bits = self.bits.lock();
        *bits |= mask;
        self.cond.notify_one();
    }

    /// Clear `mask`.
    pub fn clear(&self, mask: u32) {
        *self.bits.lock() &= !mask;
    }

    /// True when any bit of `mask` is currently raised.
    pub fn contains(&self, mask: u32) -> bool {
        *self.bits.lock() & mask != 0
    }

    /// Block until any bit of `mask` is raised. Bits are left set; the caller
    /// clears what it consumed.
    pub fn wait_any(&self, mask: u32) {
        let mut bits = self.bits.lock();
        while *bits & mask == 0 {
            self.cond.wait(&mut bits);
        }
    }
}

impl Default for EventFlags {
    fn default() -> Self {
        Self::new()
    }
}
