//! Handler watchdog.
//!
//! Every handler invocation runs under an armed deadline. A dedicated
//! supervisor thread tracks the currently armed invocation through a control
//! channel; if the disarm does not arrive within the budget, the supervisor
//! emits a fatal diagnostic with the captured message identity and runs the
//! configured action. There is no automatic recovery: a stuck handler is a
//! driver bug, and the point of the watchdog is to make it diagnosable
//! instead of a silent hang.

use crate::queues::QueueClass;
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::error;

/// Default handler budget.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(10);

/// Diagnostic captured when a handler overruns its budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogReport {
    /// Queue whose handler was running.
    pub queue: QueueClass,
    /// Tag of the message being processed.
    pub kind: u16,
    /// The budget that was exceeded.
    pub budget: Duration,
}

/// Action invoked by the supervisor thread when the budget expires.
pub type WatchdogAction = Arc<dyn Fn(&WatchdogReport) + Send + Sync>;

/// The default action: panic in the supervisor thread after the diagnostic
/// has been logged. Embedders wire their own crash-reporting machinery in via
/// [`SchedulerBuilder::watchdog_action`](crate::dispatcher::SchedulerBuilder::watchdog_action).
pub fn panic_action() -> WatchdogAction {
    Arc::new(|report: &WatchdogReport| {
        panic!(
            "handler for {} queue stuck on message kind {} past {:?}",
            report.queue, report.kind, report.budget
        );
    })
}

enum Command {
    Arm(WatchdogReport),
    Disarm,
    Stop,
}

/// Supervisor handle owned by the scheduler context.
pub struct Watchdog {
    tx: Sender<Command>,
    handle: Option<JoinHandle<()>>,
    budget: Duration,
}

impl Watchdog {
    /// Spawn the supervisor thread.
    pub fn spawn(budget: Duration, action: WatchdogAction) -> Self {
        let (tx, rx) = unbounded();
        let handle = thread::Builder::new()
            .name("sched-watchdog".to_string())
            .spawn(move || {
                let mut armed: Option<WatchdogReport> = None;
                loop {
                    match armed.take() {
                        None => match rx.recv() {
                            Ok(Command::Arm(report)) => armed = Some(report),
                            Ok(Command::Disarm) => {}
                            Ok(Command::Stop) | Err(_) => break,
                        },
                        Some(report) => match rx.recv_timeout(report.budget) {
                            Ok(Command::Disarm) => {}
                            Ok(Command::Arm(next)) => armed = Some(next),
                            Ok(Command::Stop) => break,
                            Err(RecvTimeoutError::Timeout) => {
                                error!(
                                    queue = %report.queue,
                                    kind = report.kind,
                                    budget_ms = report.budget.as_millis() as u64,
                                    "handler exceeded its watchdog budget"
                                );
                                action(&report);
                            }
                            Err(RecvTimeoutError::Disconnected) => break,
                        },
                    }
                }
            })
            .expect("failed to spawn watchdog thread");
        Self {
            tx,
            handle: Some(handle),
            budget,
        }
    }

    /// Arm the watchdog for one handler invocation. The returned guard
    /// disarms on drop, covering every exit path including panics that
    /// unwind through the handler.
    pub fn guard(&self, queue: QueueClass, kind: u16) -> WatchdogGuard<'_> {
        let _ = self.tx.send(Command::Arm(WatchdogReport {
            queue,
            kind,
            budget: self.budget,
        }));
        WatchdogGuard { watchdog: self }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Scoped arm/disarm around a single handler invocation.
pub struct WatchdogGuard<'a> {
    watchdog: &'a Watchdog,
}

impl Drop for WatchdogGuard<'_> {
    fn drop(&mut self) {
        let _ = self.watchdog.tx.send(Command::Disarm);
    }
}
