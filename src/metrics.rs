//! Dispatch counters.
//!
//! Per-queue counters are plain relaxed atomics bumped on the hot path and
//! aggregated into a serializable snapshot on demand, so external reporting
//! never takes a scheduler lock.

use crate::error::PostError;
use crate::queues::{QueueClass, QueueTable};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct QueueCounters {
    posted: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    flushed: AtomicU64,
}

/// Counter set owned by the scheduler context.
pub struct SchedulerMetrics {
    queues: QueueTable<QueueCounters>,
    rejected_unknown_module: AtomicU64,
    rejected_pool_exhausted: AtomicU64,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self {
            queues: QueueTable::from_fn(|_| QueueCounters::default()),
            rejected_unknown_module: AtomicU64::new(0),
            rejected_pool_exhausted: AtomicU64::new(0),
        }
    }

    pub fn note_posted(&self, class: QueueClass) {
        self.queues[class].posted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_processed(&self, class: QueueClass) {
        self.queues[class].processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_failed(&self, class: QueueClass) {
        self.queues[class].failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_flushed(&self, class: QueueClass) {
        self.queues[class].flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_rejected(&self, error: &PostError) {
        let counter = match error {
            PostError::UnknownModule(_) => &self.rejected_unknown_module,
            PostError::PoolExhausted => &self.rejected_pool_exhausted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Capture a consistent-enough view of the counters for reporting.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queues: QueueClass::ALL
                .iter()
                .map(|&class| {
                    let counters = &self.queues[class];
                    QueueSnapshot {
                        queue: class,
                        posted: counters.posted.load(Ordering::Relaxed),
                        processed: counters.processed.load(Ordering::Relaxed),
                        failed: counters.failed.load(Ordering::Relaxed),
                        flushed: counters.flushed.load(Ordering::Relaxed),
                    }
                })
                .collect(),
            rejected_unknown_module: self.rejected_unknown_module.load(Ordering::Relaxed),
            rejected_pool_exhausted: self.rejected_pool_exhausted.load(Ordering::Relaxed),
        }
    }
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time counters for one queue class.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub queue: QueueClass,
    pub posted: u64,
    pub processed: u64,
    pub failed: u64,
    pub flushed: u64,
}

/// Point-in-time view of every dispatch counter.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub queues: Vec<QueueSnapshot>,
    pub rejected_unknown_module: u64,
    pub rejected_pool_exhausted: u64,
}
