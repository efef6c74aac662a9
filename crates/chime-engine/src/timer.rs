//! Background polling loop and its lifecycle.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

use crate::service::ReminderService;
use crate::{EngineError, PollStats};

/// Minimum poll interval.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default poll interval.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// How often `stop` re-checks the worker while waiting for it to exit.
const JOIN_POLL_STEP: Duration = Duration::from_millis(10);

/// Type alias for an arbitrary periodic side task run after each poll.
pub type PeriodicTask =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync>;

/// The timer engine's view of the reminder service.
#[async_trait]
pub trait Poller: Send + Sync {
    async fn poll_once(&self) -> Result<PollStats, EngineError>;
}

#[async_trait]
impl Poller for ReminderService {
    async fn poll_once(&self) -> Result<PollStats, EngineError> {
        ReminderService::poll_once(self).await
    }
}

/// A live background worker: the loop task plus its shutdown channel.
struct Worker {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the background polling loop.
///
/// Lifecycle: Idle -> `start()` -> Running -> `stop()` -> Idle. `start()`
/// while running is a no-op, so there is never more than one loop. Every
/// tick failure is caught and logged at the tick boundary; the loop always
/// proceeds to the next interruptible wait.
pub struct TimerEngine {
    poller: Arc<dyn Poller>,
    periodic_tasks: Vec<PeriodicTask>,
    poll_interval: Duration,
    worker: Mutex<Option<Worker>>,
}

impl TimerEngine {
    pub fn new(poller: Arc<dyn Poller>) -> Self {
        Self {
            poller,
            periodic_tasks: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            worker: Mutex::new(None),
        }
    }

    /// Seconds between ticks. Clamped to at least one second.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Register a periodic side task, run after the poll on every tick.
    pub fn with_periodic_task(mut self, task: PeriodicTask) -> Self {
        self.periodic_tasks.push(task);
        self
    }

    /// Whether the background loop is currently alive.
    pub async fn running(&self) -> bool {
        self.worker
            .lock()
            .await
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Spawn the background loop. No-op while a loop is already alive.
    pub async fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().await;
        if let Some(existing) = worker.as_ref()
            && !existing.handle.is_finished()
        {
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move { engine.run_loop(shutdown_rx).await });
        *worker = Some(Worker {
            shutdown_tx,
            handle,
        });
        info!("timer started");
    }

    /// Signal the loop to stop and wait for the worker, up to `join_timeout`.
    ///
    /// If the worker does not exit in time this logs a warning and returns;
    /// the worker handle stays in place, so `running` remains true until the
    /// loop actually exits and a later `start()` can take over cleanly.
    pub async fn stop(&self, join_timeout: Duration) {
        {
            let worker = self.worker.lock().await;
            let Some(worker) = worker.as_ref() else {
                return;
            };
            let _ = worker.shutdown_tx.send(true);
        }

        let deadline = Instant::now() + join_timeout;
        loop {
            {
                let mut worker = self.worker.lock().await;
                match worker.as_ref() {
                    None => return,
                    Some(w) if w.handle.is_finished() => {
                        *worker = None;
                        return;
                    }
                    Some(_) => {}
                }
            }
            if Instant::now() >= deadline {
                warn!(
                    timeout_ms = join_timeout.as_millis() as u64,
                    "timer worker did not stop in time"
                );
                return;
            }
            sleep(JOIN_POLL_STEP).await;
        }
    }

    /// Run one tick: poll the reminder service, then each periodic task in
    /// order. Failures are logged and never abort the remaining tasks.
    pub async fn tick_once(&self) {
        match self.poller.poll_once().await {
            Ok(stats) => {
                if stats.candidate_count > 0 {
                    info!(
                        candidates = stats.candidate_count,
                        delivered = stats.delivered_count,
                        skipped = stats.skipped_count,
                        failed = stats.failed_count,
                        "timer tick"
                    );
                }
            }
            Err(error) => {
                warn!(%error, "reminder poll failed");
            }
        }

        for (index, task) in self.periodic_tasks.iter().enumerate() {
            if let Err(error) = task().await {
                warn!(index, %error, "periodic task failed");
            }
        }
    }

    async fn run_loop(&self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            self.tick_once().await;

            // Interruptible wait: stop() flips the watch channel so the
            // loop exits without waiting out a full interval.
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = sleep(self.poll_interval) => {}
            }
        }
        info!("timer loop shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Poller that counts calls and can fail every time.
    struct FakePoller {
        poll_count: AtomicUsize,
        fail: bool,
    }

    impl FakePoller {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                poll_count: AtomicUsize::new(0),
                fail,
            })
        }

        fn count(&self) -> usize {
            self.poll_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Poller for FakePoller {
        async fn poll_once(&self) -> Result<PollStats, EngineError> {
            self.poll_count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EngineError::Store(crate::StoreError::Backend(
                    "boom".to_string(),
                )));
            }
            Ok(PollStats::default())
        }
    }

    /// Poller that parks inside `poll_once` until released.
    struct BlockingPoller {
        poll_count: AtomicUsize,
        entered: Notify,
        release: Notify,
    }

    impl BlockingPoller {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                poll_count: AtomicUsize::new(0),
                entered: Notify::new(),
                release: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl Poller for BlockingPoller {
        async fn poll_once(&self) -> Result<PollStats, EngineError> {
            self.poll_count.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(PollStats::default())
        }
    }

    #[tokio::test]
    async fn tick_once_calls_poller() {
        let poller = FakePoller::new(false);
        let engine = TimerEngine::new(poller.clone());

        engine.tick_once().await;

        assert_eq!(poller.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_loop() {
        let poller = FakePoller::new(false);
        let engine = Arc::new(
            TimerEngine::new(poller.clone()).with_poll_interval(Duration::from_secs(1)),
        );

        engine.start().await;
        sleep(Duration::from_millis(100)).await;
        assert!(engine.running().await);

        engine.stop(Duration::from_secs(1)).await;

        assert!(poller.count() >= 1);
        assert!(!engine.running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_running_is_a_no_op() {
        let poller = BlockingPoller::new();
        let engine = Arc::new(
            TimerEngine::new(poller.clone()).with_poll_interval(Duration::from_secs(1)),
        );

        engine.start().await;
        poller.entered.notified().await;
        engine.start().await;
        sleep(Duration::from_millis(100)).await;

        // Still exactly one loop, parked inside its first poll.
        assert_eq!(poller.poll_count.load(Ordering::SeqCst), 1);

        poller.release.notify_one();
        engine.stop(Duration::from_secs(1)).await;
        assert!(!engine.running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_survives_poll_failure() {
        let poller = FakePoller::new(true);
        let engine = Arc::new(
            TimerEngine::new(poller.clone()).with_poll_interval(Duration::from_secs(1)),
        );

        engine.start().await;
        sleep(Duration::from_secs(5)).await;
        engine.stop(Duration::from_secs(1)).await;

        // The loop kept ticking past the failures.
        assert!(poller.count() >= 2);
        assert!(!engine.running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_timeout_keeps_worker_recoverable() {
        let poller = BlockingPoller::new();
        let engine = Arc::new(
            TimerEngine::new(poller.clone()).with_poll_interval(Duration::from_secs(1)),
        );

        engine.start().await;
        poller.entered.notified().await;

        // Worker is parked in poll_once; stop cannot join it in time.
        engine.stop(Duration::from_millis(50)).await;
        assert!(engine.running().await);

        // start() is still a no-op while the old worker lives.
        engine.start().await;
        assert_eq!(poller.poll_count.load(Ordering::SeqCst), 1);

        // Once released, the loop observes the shutdown signal and exits.
        poller.release.notify_one();
        engine.stop(Duration::from_secs(5)).await;
        assert!(!engine.running().await);
    }

    #[tokio::test]
    async fn tick_runs_periodic_tasks_and_isolates_failures() {
        let poller = FakePoller::new(false);
        let failing = Arc::new(AtomicUsize::new(0));
        let succeeding = Arc::new(AtomicUsize::new(0));

        let failing_counter = Arc::clone(&failing);
        let succeeding_counter = Arc::clone(&succeeding);
        let engine = TimerEngine::new(poller.clone())
            .with_periodic_task(Box::new(move || {
                let counter = Arc::clone(&failing_counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("periodic task failed".to_string())
                })
            }))
            .with_periodic_task(Box::new(move || {
                let counter = Arc::clone(&succeeding_counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }));

        engine.tick_once().await;

        assert_eq!(poller.count(), 1);
        assert_eq!(failing.load(Ordering::SeqCst), 1);
        assert_eq!(succeeding.load(Ordering::SeqCst), 1);
    }
}
