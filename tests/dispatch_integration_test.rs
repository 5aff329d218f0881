//! End-to-end dispatch ordering, suspend/resume, and shutdown behavior.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use priority_dispatch::{
    HandlerError, ModuleId, PostError, QueueClass, Scheduler, SchedulerBuilder, SchedulerConfig,
    SchedulerMessage,
};

const RECV_BUDGET: Duration = Duration::from_secs(2);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn small_config() -> SchedulerConfig {
    SchedulerConfig {
        pool_depth: 16,
        watchdog_budget: Duration::from_secs(5),
        ..SchedulerConfig::default()
    }
}

/// Scheduler wired so every handler invocation is observable on a channel,
/// with a suspend ack channel for deterministic parking.
struct Harness {
    scheduler: Scheduler,
    events: Receiver<(QueueClass, u16)>,
    acks: Receiver<()>,
}

impl Harness {
    fn new() -> Self {
        let (event_tx, event_rx) = unbounded();
        let (ack_tx, ack_rx) = unbounded();

        let sink = |queue: QueueClass, tx: Sender<(QueueClass, u16)>| {
            move |msg: SchedulerMessage| -> Result<(), HandlerError> {
                tx.send((queue, msg.kind)).unwrap();
                Ok(())
            }
        };

        let scheduler = SchedulerBuilder::new(small_config())
            .register(
                QueueClass::Timer,
                sink(QueueClass::Timer, event_tx.clone()),
                &[ModuleId::Timers],
            )
            .register(
                QueueClass::System,
                sink(QueueClass::System, event_tx.clone()),
                &[ModuleId::Power, ModuleId::Firmware],
            )
            .register(
                QueueClass::Control,
                sink(QueueClass::Control, event_tx.clone()),
                &[ModuleId::Mlme, ModuleId::Session],
            )
            .register(
                QueueClass::Data,
                sink(QueueClass::Data, event_tx),
                &[ModuleId::Datapath],
            )
            .suspend_callback(move || {
                ack_tx.send(()).unwrap();
            })
            .build();
        scheduler.start().unwrap();

        Self {
            scheduler,
            events: event_rx,
            acks: ack_rx,
        }
    }

    /// Park the dispatcher so a batch of posts is observed in one scan pass.
    fn park(&self) {
        self.scheduler.request_suspend();
        self.acks
            .recv_timeout(RECV_BUDGET)
            .expect("suspend ack did not fire");
    }

    fn drain_events(&self, count: usize) -> Vec<(QueueClass, u16)> {
        (0..count)
            .map(|_| self.events.recv_timeout(RECV_BUDGET).unwrap())
            .collect()
    }
}

// Scenario A: a message pending on a higher-priority queue is serviced before
// one already pending on a lower-priority queue.
#[test]
fn higher_priority_queue_is_drained_first() {
    init_tracing();
    let harness = Harness::new();
    harness.park();

    harness
        .scheduler
        .post(ModuleId::Power, SchedulerMessage::new(5))
        .unwrap();
    harness
        .scheduler
        .post(ModuleId::Timers, SchedulerMessage::new(7))
        .unwrap();
    harness.scheduler.request_resume();

    let events = harness.drain_events(2);
    assert_eq!(
        events,
        vec![(QueueClass::Timer, 7), (QueueClass::System, 5)]
    );
    harness.scheduler.shutdown().unwrap();
}

// Scenario C: FIFO within one queue.
#[test]
fn fifo_order_within_a_queue() {
    init_tracing();
    let harness = Harness::new();
    harness.park();

    for kind in [1u16, 2, 3] {
        harness
            .scheduler
            .post(ModuleId::Mlme, SchedulerMessage::new(kind))
            .unwrap();
    }
    harness.scheduler.request_resume();

    let kinds: Vec<u16> = harness.drain_events(3).into_iter().map(|(_, k)| k).collect();
    assert_eq!(kinds, vec![1, 2, 3]);
    harness.scheduler.shutdown().unwrap();
}

// Scenario D: put_front jumps ahead of everything already queued.
#[test]
fn post_front_overtakes_pending_messages() {
    init_tracing();
    let harness = Harness::new();
    harness.park();

    harness
        .scheduler
        .post(ModuleId::Mlme, SchedulerMessage::new(1))
        .unwrap();
    harness
        .scheduler
        .post(ModuleId::Mlme, SchedulerMessage::new(2))
        .unwrap();
    harness
        .scheduler
        .post_front(ModuleId::Mlme, SchedulerMessage::new(3))
        .unwrap();
    harness.scheduler.request_resume();

    let kinds: Vec<u16> = harness.drain_events(3).into_iter().map(|(_, k)| k).collect();
    assert_eq!(kinds, vec![3, 1, 2]);
    harness.scheduler.shutdown().unwrap();
}

// Scenario B: the pool rejects the post after depth wrappers are in flight.
#[test]
fn pool_exhaustion_rejects_post() {
    init_tracing();
    let config = SchedulerConfig {
        pool_depth: 2,
        ..small_config()
    };
    let (tx, _rx) = unbounded();
    let scheduler = SchedulerBuilder::new(config)
        .register(
            QueueClass::Data,
            move |msg: SchedulerMessage| -> Result<(), HandlerError> {
                tx.send(msg.kind).unwrap();
                Ok(())
            },
            &[ModuleId::Datapath],
        )
        .build();
    // Not started: everything posted stays queued, holding its wrapper.

    scheduler
        .post(ModuleId::Datapath, SchedulerMessage::new(1))
        .unwrap();
    scheduler
        .post(ModuleId::Datapath, SchedulerMessage::new(2))
        .unwrap();
    let err = scheduler
        .post(ModuleId::Datapath, SchedulerMessage::new(3))
        .unwrap_err();
    assert_eq!(err, PostError::PoolExhausted);
    assert_eq!(scheduler.metrics().rejected_pool_exhausted, 1);

    assert_eq!(scheduler.flush_queue(QueueClass::Data), 2);
    assert_eq!(scheduler.pool_available(), scheduler.pool_depth());
}

// Scenario E: the ack fires at the quiescent point with nothing pending, and
// no message posted during suspension is processed until resume.
#[test]
fn suspend_parks_the_dispatcher_until_resume() {
    init_tracing();
    let harness = Harness::new();

    harness.scheduler.request_suspend();
    harness
        .acks
        .recv_timeout(RECV_BUDGET)
        .expect("suspend ack must fire without a resume");

    harness
        .scheduler
        .post(ModuleId::Session, SchedulerMessage::new(9))
        .unwrap();
    assert!(
        harness
            .events
            .recv_timeout(Duration::from_millis(150))
            .is_err(),
        "no dispatch may happen while suspended"
    );

    harness.scheduler.request_resume();
    assert_eq!(harness.drain_events(1), vec![(QueueClass::Control, 9)]);
    harness.scheduler.shutdown().unwrap();
}

// Scenario F: shutdown overtakes a pending suspend; the ack still fires
// exactly once before the thread exits.
#[test]
fn shutdown_releases_a_pending_suspend() {
    init_tracing();
    let (entered_tx, entered_rx) = unbounded();
    let (gate_tx, gate_rx) = unbounded::<()>();
    let acks = Arc::new(AtomicUsize::new(0));

    let acks_cb = acks.clone();
    let scheduler = SchedulerBuilder::new(small_config())
        .register(
            QueueClass::Control,
            move |_msg: SchedulerMessage| -> Result<(), HandlerError> {
                entered_tx.send(()).unwrap();
                gate_rx.recv().unwrap();
                Ok(())
            },
            &[ModuleId::Mlme],
        )
        .suspend_callback(move || {
            acks_cb.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    scheduler.start().unwrap();

    scheduler
        .post(ModuleId::Mlme, SchedulerMessage::new(1))
        .unwrap();
    entered_rx
        .recv_timeout(RECV_BUDGET)
        .expect("handler never entered");

    // The dispatcher is pinned inside the handler, so this suspend stays
    // pending until after shutdown is signaled.
    scheduler.request_suspend();
    assert_eq!(acks.load(Ordering::SeqCst), 0);

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        gate_tx.send(()).unwrap();
    });
    scheduler.shutdown().unwrap();
    releaser.join().unwrap();

    assert_eq!(acks.load(Ordering::SeqCst), 1);
}

// P7: a failing handler must not wedge the dispatcher.
#[test]
fn handler_error_does_not_stop_the_loop() {
    init_tracing();
    let (tx, rx) = unbounded();
    let scheduler = SchedulerBuilder::new(small_config())
        .register(
            QueueClass::Control,
            move |msg: SchedulerMessage| -> Result<(), HandlerError> {
                tx.send(msg.kind).unwrap();
                if msg.kind == 1 {
                    Err("synthetic handler failure".into())
                } else {
                    Ok(())
                }
            },
            &[ModuleId::Mlme],
        )
        .build();
    scheduler.start().unwrap();

    scheduler
        .post(ModuleId::Mlme, SchedulerMessage::new(1))
        .unwrap();
    scheduler
        .post(ModuleId::Mlme, SchedulerMessage::new(2))
        .unwrap();

    assert_eq!(rx.recv_timeout(RECV_BUDGET).unwrap(), 1);
    assert_eq!(rx.recv_timeout(RECV_BUDGET).unwrap(), 2);

    let snapshot = scheduler.metrics();
    let control = &snapshot.queues[QueueClass::Control.index()];
    assert_eq!(control.failed, 1);
    assert_eq!(control.processed, 1);
    scheduler.shutdown().unwrap();
}

// P1: every wrapper is back on the free list once traffic quiesces.
#[test]
fn pool_conservation_after_traffic() {
    init_tracing();
    let harness = Harness::new();
    for kind in 0..10u16 {
        harness
            .scheduler
            .post(ModuleId::Datapath, SchedulerMessage::new(kind))
            .unwrap();
    }
    let _ = harness.drain_events(10);
    harness.scheduler.shutdown().unwrap();
    assert_eq!(
        harness.scheduler.pool_available(),
        harness.scheduler.pool_depth()
    );
}
