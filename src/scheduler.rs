//! Fixed-interval task scheduler.
//!
//! Runs a [`Task`] immediately, then on every interval tick until the
//! cancellation token fires. Runs never overlap; ticks that pass while a
//! run is in progress are coalesced into one.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// One unit of scheduled work.
#[async_trait]
pub trait Task: Send + Sync {
    type Error: fmt::Display + Send;

    /// Perform one run. Long-running work should watch `cancel`.
    async fn run(&self, cancel: &CancellationToken) -> Result<(), Self::Error>;
}

/// Where the scheduler is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick.
    Idle,
    /// A run is in progress.
    Running,
    /// Cancellation arrived during a run; waiting for it to wind down.
    Cancelling,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Cancelling => write!(f, "cancelling"),
        }
    }
}

/// Counters for a finished scheduler loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub runs: u64,
    pub failures: u64,
}

/// Runs a task now and then every `interval`.
pub struct Scheduler<T> {
    interval: Duration,
    task: T,
    state: watch::Sender<SchedulerState>,
}

impl<T: Task> Scheduler<T> {
    pub fn new(interval: Duration, task: T) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            interval,
            task,
            state,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Current state.
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    fn transition(&self, next: SchedulerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "scheduler state");
        }
    }

    /// Loop until `cancel` fires.
    ///
    /// A failed run is logged and counted; it never stops the loop or moves
    /// the schedule. Cancellation does not abort a run in progress: the
    /// task sees the same token and is awaited to completion.
    pub async fn run(&self, cancel: &CancellationToken) -> SchedulerReport {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut report = SchedulerReport::default();
        let every = humantime::format_duration(self.interval);

        info!(interval = %every, "scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.transition(SchedulerState::Running);
            let run = self.task.run(cancel);
            tokio::pin!(run);

            let outcome = tokio::select! {
                biased;
                outcome = &mut run => outcome,
                _ = cancel.cancelled() => {
                    self.transition(SchedulerState::Cancelling);
                    run.await
                }
            };

            report.runs += 1;
            if let Err(e) = outcome {
                report.failures += 1;
                error!(error = %e, "scheduled run failed");
            }

            if cancel.is_cancelled() {
                break;
            }
            self.transition(SchedulerState::Idle);
            info!(next_in = %every, "next scan scheduled");
        }

        self.transition(SchedulerState::Idle);
        info!(runs = report.runs, failures = report.failures, "scheduler stopped");
        report
    }
}

impl<T> fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("interval", &self.interval)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::{sleep, Instant};

    #[derive(Default)]
    struct Probe {
        runs: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    struct FakeTask {
        probe: Arc<Probe>,
        duration: Duration,
        fail: bool,
        started: Arc<std::sync::Mutex<Vec<Duration>>>,
        origin: Instant,
    }

    impl FakeTask {
        fn new(duration: Duration, fail: bool) -> Self {
            Self {
                probe: Arc::default(),
                duration,
                fail,
                started: Arc::default(),
                origin: Instant::now(),
            }
        }
    }

    #[async_trait]
    impl Task for FakeTask {
        type Error = String;

        async fn run(&self, _cancel: &CancellationToken) -> Result<(), String> {
            self.started.lock().unwrap().push(self.origin.elapsed());
            self.probe.runs.fetch_add(1, Ordering::SeqCst);
            let now = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.probe.max_in_flight.fetch_max(now, Ordering::SeqCst);

            sleep(self.duration).await;

            self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                Err("scan: no targets specified".to_string())
            } else {
                Ok(())
            }
        }
    }

    async fn cancel_after(cancel: &CancellationToken, after: Duration) {
        sleep(after).await;
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_every_interval() {
        let task = FakeTask::new(Duration::from_secs(1), false);
        let started = task.started.clone();
        let scheduler = Scheduler::new(Duration::from_secs(100), task);
        let cancel = CancellationToken::new();

        let (report, _) = tokio::join!(
            scheduler.run(&cancel),
            cancel_after(&cancel, Duration::from_secs(250))
        );

        assert_eq!(report, SchedulerReport { runs: 3, failures: 0 });
        let started = started.lock().unwrap().clone();
        assert_eq!(started[0], Duration::ZERO);
        assert_eq!(started[1], Duration::from_secs(100));
        assert_eq!(started[2], Duration::from_secs(200));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_loop() {
        let scheduler = Scheduler::new(
            Duration::from_secs(60),
            FakeTask::new(Duration::from_secs(1), true),
        );
        let cancel = CancellationToken::new();

        let (report, _) = tokio::join!(
            scheduler.run(&cancel),
            cancel_after(&cancel, Duration::from_secs(150))
        );

        assert_eq!(report, SchedulerReport { runs: 3, failures: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_runs_never_overlap_and_ticks_coalesce() {
        let task = FakeTask::new(Duration::from_secs(150), false);
        let probe = task.probe.clone();
        let scheduler = Scheduler::new(Duration::from_secs(100), task);
        let cancel = CancellationToken::new();

        let (report, _) = tokio::join!(
            scheduler.run(&cancel),
            cancel_after(&cancel, Duration::from_secs(500))
        );

        assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
        // Six ticks elapsed; queued ticks would have produced six runs.
        assert!(report.runs >= 3 && report.runs < 6, "runs = {}", report.runs);
        assert_eq!(report.runs as usize, probe.runs.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start_runs_nothing() {
        let scheduler = Scheduler::new(
            Duration::from_secs(10),
            FakeTask::new(Duration::ZERO, false),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = scheduler.run(&cancel).await;
        assert_eq!(report.runs, 0);
    }

    struct CooperativeTask;

    #[async_trait]
    impl Task for CooperativeTask {
        type Error = String;

        async fn run(&self, cancel: &CancellationToken) -> Result<(), String> {
            cancel.cancelled().await;
            // Simulate killing and reaping a child process.
            sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_waits_for_run_in_progress() {
        let scheduler = Scheduler::new(Duration::from_secs(60), CooperativeTask);
        let mut states = scheduler.subscribe();
        let cancel = CancellationToken::new();

        let observe = async {
            sleep(Duration::from_secs(10)).await;
            assert_eq!(scheduler.state(), SchedulerState::Running);
            cancel.cancel();
            sleep(Duration::from_secs(1)).await;
            assert_eq!(scheduler.state(), SchedulerState::Cancelling);
        };

        let started = Instant::now();
        let (report, _) = tokio::join!(scheduler.run(&cancel), observe);

        assert_eq!(report, SchedulerReport { runs: 1, failures: 0 });
        assert!(started.elapsed() >= Duration::from_secs(15));
        assert_eq!(*states.borrow_and_update(), SchedulerState::Idle);
    }
}
