//! One scan-reconcile-persist-notify cycle.
//!
//! The pipeline is the only place that decides whether a failure ends a
//! run. Loading the previous state and scanning are fatal for the run;
//! persisting, reporting and notifying are logged and the run carries on.

use crate::diff::{self, DiffResult};
use crate::error::{NotifyError, PipelineError};
use crate::notify::Notifier;
use crate::output::Reporter;
use crate::scanner::ScanDriver;
use crate::scheduler::Task;
use crate::storage::RecordStore;
use crate::types::{RunId, ScanRecord, TargetSpec};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

/// What one run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: RunId,
    /// Open ports found by this scan.
    pub open_ports: usize,
    pub new: usize,
    pub changed: usize,
    pub closed: usize,
    /// Records saved, or `None` when nothing was written.
    pub persisted: Option<usize>,
    /// Notifiers that delivered successfully.
    pub notified: usize,
}

impl RunSummary {
    pub fn has_changes(&self) -> bool {
        self.new + self.changed + self.closed > 0
    }
}

/// Scans the configured targets and reconciles them with the store.
pub struct Pipeline {
    store: Arc<dyn RecordStore>,
    driver: ScanDriver,
    targets: Vec<TargetSpec>,
    reporters: Vec<Box<dyn Reporter>>,
    notifiers: Vec<Box<dyn Notifier>>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn RecordStore>, driver: ScanDriver, targets: Vec<TargetSpec>) -> Self {
        Self {
            store,
            driver,
            targets,
            reporters: Vec::new(),
            notifiers: Vec::new(),
        }
    }

    /// Add a reporter that sees every run.
    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    /// Add a notifier that sees runs with changes.
    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn targets(&self) -> &[TargetSpec] {
        &self.targets
    }

    /// Run one cycle.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<RunSummary, PipelineError> {
        let run_id = RunId::new();
        let span = info_span!("run", run_id = %run_id.short());
        self.execute(run_id, cancel).instrument(span).await
    }

    async fn execute(
        &self,
        run_id: RunId,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();

        let prior = self
            .store
            .load_all()
            .await
            .map_err(PipelineError::LoadSnapshot)?;

        let fresh = self
            .driver
            .scan(cancel, &self.targets)
            .await
            .map_err(PipelineError::Scan)?;

        let diff = diff::compare(&fresh, &prior);
        info!(
            open_ports = fresh.len(),
            known = prior.len(),
            new = diff.new.len(),
            changed = diff.changed.len(),
            closed = diff.closed.len(),
            "scan reconciled"
        );

        let persisted = if fresh.is_empty() {
            None
        } else {
            match self.store.upsert(&fresh).await {
                Ok(saved) => Some(saved),
                Err(e) => {
                    error!(error = %e, "failed to persist scan results");
                    None
                }
            }
        };

        for reporter in &self.reporters {
            if let Err(e) = reporter.report(&fresh, &diff) {
                warn!(error = %e, "reporter failed");
            }
        }

        let notified = if diff.is_empty() {
            info!("no changes, skipping notifications");
            0
        } else {
            self.notify_all(&diff, &fresh, cancel).await
        };

        info!(elapsed_ms = started.elapsed().as_millis() as u64, "run complete");

        Ok(RunSummary {
            run_id,
            open_ports: fresh.len(),
            new: diff.new.len(),
            changed: diff.changed.len(),
            closed: diff.closed.len(),
            persisted,
            notified,
        })
    }

    async fn notify_all(
        &self,
        diff: &DiffResult,
        fresh: &[ScanRecord],
        cancel: &CancellationToken,
    ) -> usize {
        let mut delivered = 0;
        for notifier in &self.notifiers {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(NotifyError::Cancelled),
                result = notifier.notify(diff, fresh) => result,
            };

            match result {
                Ok(()) => delivered += 1,
                Err(e) => error!(notifier = notifier.name(), error = %e, "notification failed"),
            }
        }
        delivered
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("driver", &self.driver)
            .field("targets", &self.targets)
            .field("reporters", &self.reporters.len())
            .field(
                "notifiers",
                &self.notifiers.iter().map(|n| n.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[async_trait]
impl Task for Pipeline {
    type Error = PipelineError;

    async fn run(&self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        self.run_once(cancel).await.map(|_| ())
    }
}
