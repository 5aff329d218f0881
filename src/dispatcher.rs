//! Dispatch loop and scheduler lifecycle.
//!
//! This module wires the queue set, the wrapper pool, and the watchdog behind
//! a single consumer thread. Producers post from arbitrary threads; the
//! dispatcher drains the queues highest-priority first and runs every handler
//! serially, so no two handlers ever execute concurrently. Suspend/resume and
//! shutdown are coordinated through the event flags so an external caller is
//! never left blocked.

use crate::error::{HandlerError, PostError, SchedulerError};
use crate::event::{Event, EventFlags};
use crate::message::{MessageCallback, SchedulerMessage};
use crate::metrics::{MetricsSnapshot, SchedulerMetrics};
use crate::mq::MessageQueue;
use crate::pool::{MessagePool, DEFAULT_POOL_DEPTH};
use crate::queues::{ModuleId, ModuleMap, QueueClass, QueueTable};
use crate::threading::set_thread_priority;
use crate::watchdog::{panic_action, Watchdog, WatchdogAction, WatchdogReport, DEFAULT_BUDGET};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Per-queue processing logic, decided at registration time.
pub trait MessageHandler: Send + Sync {
    fn process(&self, msg: SchedulerMessage) -> Result<(), HandlerError>;
}

impl<F> MessageHandler for F
where
    F: Fn(SchedulerMessage) -> Result<(), HandlerError> + Send + Sync,
{
    fn process(&self, msg: SchedulerMessage) -> Result<(), HandlerError> {
        self(msg)
    }
}

/// Built-in handler for the timer class: each expiry message carries its own
/// callback.
struct TimerQueueHandler;

impl MessageHandler for TimerQueueHandler {
    fn process(&self, mut msg: SchedulerMessage) -> Result<(), HandlerError> {
        match msg.callback.take() {
            Some(cb) => cb(&mut msg),
            None => Err(format!("timer message kind {} carries no callback", msg.kind).into()),
        }
    }
}

/// Tunables captured at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of wrapper slots in the fixed pool.
    pub pool_depth: usize,
    /// Budget granted to a single handler invocation before the watchdog
    /// reports it stuck.
    pub watchdog_budget: Duration,
    /// Cooperative priority hint applied to the dispatcher thread.
    pub thread_priority: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_depth: DEFAULT_POOL_DEPTH,
            watchdog_budget: DEFAULT_BUDGET,
            thread_priority: 2,
        }
    }
}

/// Registration-time surface: handlers, module bindings, and side callbacks
/// are all fixed before the dispatcher thread exists, which is what lets the
/// steady-state loop read them without locks.
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    handlers: QueueTable<Option<Arc<dyn MessageHandler>>>,
    module_map: ModuleMap,
    suspend_cb: Option<Box<dyn Fn() + Send + Sync>>,
    watchdog_action: WatchdogAction,
}

impl SchedulerBuilder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            handlers: QueueTable::from_fn(|_| None),
            module_map: ModuleMap::new(),
            suspend_cb: None,
            watchdog_action: panic_action(),
        }
    }

    /// Associate a queue class with its handler and bind the module ids that
    /// resolve to it.
    pub fn register(
        mut self,
        class: QueueClass,
        handler: impl MessageHandler + 'static,
        modules: &[ModuleId],
    ) -> Self {
        self.handlers[class] = Some(Arc::new(handler));
        for &module in modules {
            self.module_map.bind(module, class);
        }
        self
    }

    /// Ack callback fired when the dispatcher reaches its suspend point.
    pub fn suspend_callback(mut self, cb: impl Fn() + Send + Sync + 'static) -> Self {
        self.suspend_cb = Some(Box::new(cb));
        self
    }

    /// Replace the default watchdog action (panic) with custom fatal-report
    /// machinery.
    pub fn watchdog_action(
        mut self,
        action: impl Fn(&WatchdogReport) + Send + Sync + 'static,
    ) -> Self {
        self.watchdog_action = Arc::new(action);
        self
    }

    pub fn build(mut self) -> Scheduler {
        // The timer class always has a handler: expirations route through the
        // callback carried by each message unless the embedder overrides it.
        if self.handlers[QueueClass::Timer].is_none() {
            self.handlers[QueueClass::Timer] = Some(Arc::new(TimerQueueHandler));
            if !self.module_map.is_bound(ModuleId::Timers) {
                self.module_map.bind(ModuleId::Timers, QueueClass::Timer);
            }
        }
        let depth = self.config.pool_depth;
        Scheduler {
            inner: Arc::new(SchedInner {
                queues: QueueTable::from_fn(|_| MessageQueue::with_capacity(depth)),
                handlers: self.handlers,
                module_map: self.module_map,
                pool: MessagePool::new(depth),
                flags: EventFlags::new(),
                resume: Event::new(),
                started: Event::new(),
                suspend_cb: self.suspend_cb,
                watchdog: Watchdog::spawn(self.config.watchdog_budget, self.watchdog_action),
                metrics: SchedulerMetrics::new(),
                thread_priority: self.config.thread_priority,
            }),
            thread: Mutex::new(None),
        }
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

struct SchedInner {
    queues: QueueTable<MessageQueue>,
    handlers: QueueTable<Option<Arc<dyn MessageHandler>>>,
    module_map: ModuleMap,
    pool: MessagePool,
    flags: EventFlags,
    resume: Event,
    started: Event,
    suspend_cb: Option<Box<dyn Fn() + Send + Sync>>,
    watchdog: Watchdog,
    metrics: SchedulerMetrics,
    thread_priority: i32,
}

/// One scheduler instance per driver load: queues, pool, the dispatcher
/// thread handle, and the suspend/shutdown coordination state.
pub struct Scheduler {
    inner: Arc<SchedInner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Spawn the dispatcher thread and wait for its start acknowledgement.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return Err(SchedulerError::AlreadyStarted);
        }
        if self.inner.flags.contains(EventFlags::SHUTDOWN) {
            return Err(SchedulerError::ShutDown);
        }
        let inner = self.inner.clone();
        let handle = thread::Builder::new()
            .name("msg-dispatch".to_string())
            .spawn(move || run_dispatch(inner))?;
        *slot = Some(handle);
        drop(slot);
        self.inner.started.wait();
        Ok(())
    }

    /// Post a message at the tail of the queue its module resolves to.
    ///
    /// Rejections are immediate (never blocking) and run the message's flush
    /// policy, so an owned payload is not leaked on a dropped post.
    pub fn post(&self, module: ModuleId, msg: SchedulerMessage) -> Result<(), PostError> {
        self.post_inner(module, msg, false)
    }

    /// Post at the head of the resolved queue, ahead of everything already
    /// pending there.
    pub fn post_front(&self, module: ModuleId, msg: SchedulerMessage) -> Result<(), PostError> {
        self.post_inner(module, msg, true)
    }

    /// Post a timer-expiry message; the built-in timer handler will run `cb`
    /// on the dispatcher thread.
    pub fn post_timer_callback(
        &self,
        kind: u16,
        cb: MessageCallback,
        value: u64,
    ) -> Result<(), PostError> {
        self.post(
            ModuleId::Timers,
            SchedulerMessage::with_value(kind, value).callback(cb),
        )
    }

    fn post_inner(
        &self,
        module: ModuleId,
        msg: SchedulerMessage,
        front: bool,
    ) -> Result<(), PostError> {
        let inner = &self.inner;
        let Some(class) = inner.module_map.resolve(module) else {
            let err = PostError::UnknownModule(module);
            inner.metrics.note_rejected(&err);
            warn!(module = %module, kind = msg.kind, "post rejected: module not registered");
            let mut msg = msg;
            msg.run_flush();
            return Err(err);
        };
        match inner.pool.acquire(msg) {
            Ok(wrapper) => {
                if front {
                    inner.queues[class].put_front(wrapper);
                } else {
                    inner.queues[class].put(wrapper);
                }
                inner.metrics.note_posted(class);
                inner.flags.raise(EventFlags::POST);
                Ok(())
            }
            Err(mut msg) => {
                let err = PostError::PoolExhausted;
                inner.metrics.note_rejected(&err);
                warn!(module = %module, kind = msg.kind, "post rejected: pool exhausted");
                msg.run_flush();
                Err(err)
            }
        }
    }

    /// Ask the dispatcher to park at its next quiescent point. The registered
    /// suspend callback fires once the current drain pass completes; queued
    /// work is retained, not lost.
    pub fn request_suspend(&self) {
        self.inner.flags.raise(EventFlags::SUSPEND);
    }

    /// Release a parked dispatcher back into its outer wait.
    pub fn request_resume(&self) {
        self.inner.resume.set();
    }

    /// Signal shutdown, join the dispatcher thread, then flush every queue.
    ///
    /// The join is the shutdown-complete event; once this returns the context
    /// can be dropped safely.
    pub fn shutdown(&self) -> Result<(), SchedulerError> {
        let handle = self
            .thread
            .lock()
            .take()
            .ok_or(SchedulerError::NotStarted)?;
        self.inner
            .flags
            .raise(EventFlags::SHUTDOWN | EventFlags::POST);
        // A dispatcher parked at its suspend point must still observe the
        // shutdown; releasing the resume event here keeps the join finite.
        self.inner.resume.set();
        if handle.join().is_err() {
            error!("dispatcher thread panicked before exit");
        }
        for class in QueueClass::ALL {
            self.flush_queue(class);
        }
        Ok(())
    }

    /// Discard every message still pending on one queue, running each
    /// message's flush policy. This is the shutdown/error-unwind path,
    /// distinct from normal processing.
    pub fn flush_queue(&self, class: QueueClass) -> usize {
        let inner = &self.inner;
        let mut flushed = 0;
        while let Some(wrapper) = inner.queues[class].get() {
            let mut msg = inner.pool.take(&wrapper);
            warn!(queue = %class, kind = msg.kind, "flushing unprocessed message");
            msg.run_flush();
            inner.pool.release(wrapper);
            inner.metrics.note_flushed(class);
            flushed += 1;
        }
        flushed
    }

    /// Point-in-time dispatch counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Wrappers currently on the free list.
    pub fn pool_available(&self) -> usize {
        self.inner.pool.free_len()
    }

    /// Total wrapper slots.
    pub fn pool_depth(&self) -> usize {
        self.inner.pool.depth()
    }

    /// Current depth of one queue.
    pub fn queue_len(&self, class: QueueClass) -> usize {
        self.inner.queues[class].len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn fire_suspend_ack(inner: &SchedInner) {
    match &inner.suspend_cb {
        Some(cb) => cb(),
        None => debug!("suspend point reached with no ack callback registered"),
    }
}

/// The execution model: sleep until work or a suspend request arrives, then
/// drain all queues in strict priority order before sleeping again.
fn run_dispatch(inner: Arc<SchedInner>) {
    set_thread_priority(inner.thread_priority);
    inner.started.set();
    debug!("dispatcher thread running");

    let mut shutdown = false;
    while !shutdown {
        inner.flags.wait_any(EventFlags::POST | EventFlags::SUSPEND);
        inner.flags.clear(EventFlags::POST);

        let mut index = 0;
        loop {
            if inner.flags.contains(EventFlags::SHUTDOWN) {
                debug!("dispatcher signaled to shut down");
                shutdown = true;
                // Shutdown wins over a pending suspend, but whoever asked for
                // the suspend must still be released.
                if inner.flags.contains(EventFlags::SUSPEND) {
                    inner.flags.clear(EventFlags::SUSPEND);
                    fire_suspend_ack(&inner);
                }
                break;
            }

            if index >= QueueClass::ALL.len() {
                // Full drain pass completed; honor a pending suspend before
                // re-entering the outer wait.
                if inner.flags.contains(EventFlags::SUSPEND) {
                    inner.flags.clear(EventFlags::SUSPEND);
                    inner.resume.reset();
                    fire_suspend_ack(&inner);
                    inner.resume.wait();
                }
                break;
            }

            let class = QueueClass::ALL[index];
            if inner.queues[class].is_empty() {
                index += 1;
                continue;
            }
            let Some(wrapper) = inner.queues[class].get() else {
                // Benign probe/pop race; retry on the next pass.
                index += 1;
                continue;
            };

            let msg = inner.pool.take(&wrapper);
            let kind = msg.kind;
            let handler = inner.handlers[class]
                .as_ref()
                .expect("message queued on a class with no registered handler");
            {
                let _watch = inner.watchdog.guard(class, kind);
                match handler.process(msg) {
                    Ok(()) => inner.metrics.note_processed(class),
                    Err(err) => {
                        inner.metrics.note_failed(class);
                        error!(queue = %class, kind, error = %err, "handler failed");
                    }
                }
            }
            inner.pool.release(wrapper);

            // Strict priority: anything that arrived on a higher queue while
            // this handler ran is serviced before lower queues continue.
            index = 0;
        }
    }

    debug!("dispatcher thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Sender};
    use std::sync::OnceLock;

    fn small_config() -> SchedulerConfig {
        SchedulerConfig {
            pool_depth: 8,
            watchdog_budget: Duration::from_secs(5),
            ..SchedulerConfig::default()
        }
    }

    #[test]
    fn unknown_module_is_rejected() {
        let scheduler = SchedulerBuilder::new(small_config()).build();
        let err = scheduler
            .post(ModuleId::Datapath, SchedulerMessage::new(1))
            .unwrap_err();
        assert_eq!(err, PostError::UnknownModule(ModuleId::Datapath));
        assert_eq!(scheduler.metrics().rejected_unknown_module, 1);
    }

    #[test]
    fn rejected_post_keeps_pool_intact() {
        let scheduler = SchedulerBuilder::new(small_config()).build();
        let depth = scheduler.pool_depth();
        let _ = scheduler.post(ModuleId::Datapath, SchedulerMessage::new(1));
        assert_eq!(scheduler.pool_available(), depth);
    }

    static TIMER_SINK: OnceLock<Sender<u64>> = OnceLock::new();

    fn timer_cb(msg: &mut SchedulerMessage) -> Result<(), HandlerError> {
        TIMER_SINK.get().unwrap().send(msg.value).unwrap();
        Ok(())
    }

    #[test]
    fn timer_callback_routes_through_default_handler() {
        let (tx, rx) = unbounded();
        TIMER_SINK.get_or_init(|| tx);

        let scheduler = SchedulerBuilder::new(small_config()).build();
        scheduler.start().unwrap();
        scheduler.post_timer_callback(3, timer_cb, 42).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 42);
        scheduler.shutdown().unwrap();
    }

    #[test]
    fn shutdown_flushes_pending_messages() {
        let (tx, rx) = unbounded::<u16>();
        let scheduler = SchedulerBuilder::new(small_config())
            .register(
                QueueClass::Control,
                move |msg: SchedulerMessage| -> Result<(), HandlerError> {
                    tx.send(msg.kind).unwrap();
                    Ok(())
                },
                &[ModuleId::Mlme],
            )
            .build();

        // Never started: messages stay queued and the shutdown path flushes.
        scheduler
            .post(ModuleId::Mlme, SchedulerMessage::new(5))
            .unwrap();
        assert_eq!(scheduler.queue_len(QueueClass::Control), 1);
        assert_eq!(scheduler.flush_queue(QueueClass::Control), 1);
        assert_eq!(scheduler.pool_available(), scheduler.pool_depth());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn start_twice_is_rejected() {
        let scheduler = SchedulerBuilder::new(small_config()).build();
        scheduler.start().unwrap();
        assert!(matches!(
            scheduler.start(),
            Err(SchedulerError::AlreadyStarted)
        ));
        scheduler.shutdown().unwrap();
        assert!(matches!(scheduler.start(), Err(SchedulerError::ShutDown)));
    }
}
