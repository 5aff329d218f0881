//! Message representation shared by producers and the dispatch loop.

use crate::error::HandlerError;
use std::any::Any;
use std::fmt;

/// Processing entry point optionally carried by a message.
///
/// Timer-class messages use this to route each expiry back to the code that
/// armed the timer; the dispatcher also records it for watchdog attribution.
pub type MessageCallback = fn(&mut SchedulerMessage) -> Result<(), HandlerError>;

/// Cleanup applied when a message is discarded without normal processing
/// (queue flush at shutdown, or a rejected post).
#[derive(Clone, Copy, Default)]
pub enum FlushPolicy {
    /// Drop the owned payload, if any. The default.
    #[default]
    FreePayload,
    /// Run a custom callback instead of the default payload drop.
    Custom(fn(&mut SchedulerMessage)),
}

impl fmt::Debug for FlushPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushPolicy::FreePayload => f.write_str("FreePayload"),
            FlushPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A unit of work travelling through the dispatcher.
///
/// A message is filled in by a producer, enqueued on exactly one priority
/// queue, dequeued once by the dispatcher thread, then processed or flushed.
/// The `value` scalar and the `payload` box are independent channels: small
/// messages ride entirely in `value`, larger ones own a boxed payload that is
/// dropped (or flushed) if the message never reaches its handler.
pub struct SchedulerMessage {
    /// Semantic message tag; ranges are assigned by the embedding driver.
    pub kind: u16,
    /// Inline scalar payload.
    pub value: u64,
    /// Owned opaque payload.
    pub payload: Option<Box<dyn Any + Send>>,
    /// Optional processing entry point carried by the message itself.
    pub callback: Option<MessageCallback>,
    /// Discard-time cleanup override.
    pub flush: FlushPolicy,
}

impl SchedulerMessage {
    /// Create an empty message with the given tag.
    pub fn new(kind: u16) -> Self {
        Self {
            kind,
            value: 0,
            payload: None,
            callback: None,
            flush: FlushPolicy::default(),
        }
    }

    /// Create a message carrying only an inline scalar.
    pub fn with_value(kind: u16, value: u64) -> Self {
        Self {
            value,
            ..Self::new(kind)
        }
    }

    /// Create a message owning a boxed payload.
    pub fn with_payload(kind: u16, payload: Box<dyn Any + Send>) -> Self {
        Self {
            payload: Some(payload),
            ..Self::new(kind)
        }
    }

    /// Attach a processing callback (builder style).
    pub fn callback(mut self, cb: MessageCallback) -> Self {
        self.callback = Some(cb);
        self
    }

    /// Override the discard-time cleanup (builder style).
    pub fn flush_with(mut self, policy: FlushPolicy) -> Self {
        self.flush = policy;
        self
    }

    /// Apply the flush policy. Called on every message discarded unprocessed.
    pub(crate) fn run_flush(&mut self) {
        match self.flush {
            FlushPolicy::FreePayload => {
                self.payload = None;
            }
            FlushPolicy::Custom(cb) => cb(self),
        }
        self.value = 0;
        self.kind = 0;
    }
}

impl fmt::Debug for SchedulerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerMessage")
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("payload", &self.payload.is_some())
            .field("callback", &self.callback.is_some())
            .field("flush", &self.flush)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn default_flush_drops_payload() {
        let mut msg = SchedulerMessage::with_payload(3, Box::new(vec![1u8, 2, 3]));
        msg.run_flush();
        assert!(msg.payload.is_none());
        assert_eq!(msg.kind, 0);
        assert_eq!(msg.value, 0);
    }

    #[test]
    fn custom_flush_runs_instead_of_payload_drop() {
        static RAN: AtomicBool = AtomicBool::new(false);
        fn record(_msg: &mut SchedulerMessage) {
            RAN.store(true, Ordering::SeqCst);
        }

        let mut msg = SchedulerMessage::with_value(7, 42).flush_with(FlushPolicy::Custom(record));
        msg.run_flush();
        assert!(RAN.load(Ordering::SeqCst));
    }
}
