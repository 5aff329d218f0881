//! Typed errors for the posting path and scheduler lifecycle.

use crate::queues::ModuleId;
use thiserror::Error;

/// Opaque error returned by message handlers.
///
/// Handler failures are logged by the dispatch loop and never escalated; each
/// message is an independent unit of work.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Rejections surfaced to producers when a post cannot be accepted.
///
/// Both variants are local, recoverable conditions. The caller decides whether
/// to drop the work item, retry later, or escalate; the scheduler never
/// blocks a producer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PostError {
    /// The module id was never bound to a queue during registration.
    #[error("no queue registered for module {0}")]
    UnknownModule(ModuleId),
    /// Every wrapper in the fixed pool is in circulation.
    #[error("message pool exhausted")]
    PoolExhausted,
}

/// Lifecycle failures from [`Scheduler`](crate::dispatcher::Scheduler) operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("dispatcher thread already started")]
    AlreadyStarted,
    #[error("dispatcher thread is not running")]
    NotStarted,
    #[error("scheduler has been shut down")]
    ShutDown,
    #[error("failed to spawn dispatcher thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}
