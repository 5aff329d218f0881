//! Serialized priority message dispatcher.
//!
//! Producers on arbitrary threads post messages into a fixed set of priority
//! queues; a single consumer thread drains them highest-priority first and
//! runs the registered handler for each, under watchdog supervision. Wrapper
//! slots come from a bounded pool, so the posting path never allocates and
//! overload surfaces as an explicit rejection instead of unbounded growth.

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod message;
pub mod metrics;
pub mod mq;
pub mod pool;
pub mod queues;
pub mod threading;
pub mod watchdog;

// Re-export the embedding surface.
pub use dispatcher::{MessageHandler, Scheduler, SchedulerBuilder, SchedulerConfig};
pub use error::{HandlerError, PostError, SchedulerError};
pub use message::{FlushPolicy, MessageCallback, SchedulerMessage};
pub use queues::{ModuleId, QueueClass};
