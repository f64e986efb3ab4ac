//! Scanner module - drives the external scan engine.
//!
//! [`ScanDriver`] launches an engine, decodes its streamed JSON output into
//! [`ScanRecord`]s as it arrives, and ties the engine's lifetime to a
//! [`CancellationToken`]. Targets are either batched into one engine launch
//! or fanned out one launch per target.

pub mod codec;
pub mod event;
pub mod masscan;
pub mod replay;
pub mod traits;

use crate::error::{DecodeError, ScanError, ScanResult};
use crate::types::{ScanRecord, TargetSpec};
use chrono::Utc;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use codec::{CodecError, Frame, JsonArrayCodec, DEFAULT_MAX_ELEMENT_LEN};
pub use event::{RawPortEntry, RawScanEvent, RawService};
pub use masscan::MasscanEngine;
pub use replay::ReplayEngine;
pub use traits::{EngineExit, EngineHandle, EngineOutput, EngineRun, ScanEngine};

/// How targets are distributed over engine launches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStrategy {
    /// One launch covering every target.
    Batched,
    /// One launch per target, at most `max_parallel` at a time.
    PerTarget { max_parallel: usize },
}

impl Default for ScanStrategy {
    fn default() -> Self {
        Self::Batched
    }
}

impl fmt::Display for ScanStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batched => write!(f, "batched"),
            Self::PerTarget { max_parallel } => write!(f, "per-target (max {})", max_parallel),
        }
    }
}

/// Tunables for one driver.
#[derive(Debug, Clone, Copy)]
pub struct DriverOptions {
    pub strategy: ScanStrategy,
    /// Optional deadline per engine launch; reaching it acts like cancellation.
    pub scan_timeout: Option<Duration>,
    /// Largest host object accepted from the engine.
    pub max_element_len: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            strategy: ScanStrategy::Batched,
            scan_timeout: None,
            max_element_len: DEFAULT_MAX_ELEMENT_LEN,
        }
    }
}

/// Why reading an engine's output stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Finished,
    Cancelled,
    DeadlineReached,
    Unreadable,
}

/// Counters for one engine launch.
#[derive(Debug, Default, Clone, Copy)]
struct DecodeStats {
    hosts: usize,
    skipped: usize,
}

/// Launches scans and turns engine output into records.
#[derive(Clone)]
pub struct ScanDriver {
    engine: Arc<dyn ScanEngine>,
    options: DriverOptions,
}

impl fmt::Debug for ScanDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanDriver")
            .field("engine", &self.engine.name())
            .field("options", &self.options)
            .finish()
    }
}

impl ScanDriver {
    pub fn new(engine: Arc<dyn ScanEngine>) -> Self {
        Self {
            engine,
            options: DriverOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Scan `targets` and return every open port found.
    ///
    /// Cancellation is not an error: the engine is killed and the records
    /// decoded so far are returned. Failing to start the engine is.
    pub async fn scan(
        &self,
        cancel: &CancellationToken,
        targets: &[TargetSpec],
    ) -> ScanResult<Vec<ScanRecord>> {
        if targets.is_empty() {
            return Err(ScanError::NoTargets);
        }

        let targets: Vec<String> = targets.iter().map(ToString::to_string).collect();
        let started = Instant::now();

        let records = match self.options.strategy {
            ScanStrategy::PerTarget { max_parallel } if targets.len() > 1 => {
                self.scan_fan_out(cancel, targets.clone(), max_parallel.max(1))
                    .await?
            }
            _ => self.scan_batch(cancel, &targets).await?,
        };

        info!(
            engine = self.engine.name(),
            strategy = %self.options.strategy,
            targets = targets.len(),
            open_ports = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scan complete"
        );
        Ok(records)
    }

    /// One engine launch for all `targets`.
    async fn scan_batch(
        &self,
        cancel: &CancellationToken,
        targets: &[String],
    ) -> ScanResult<Vec<ScanRecord>> {
        let run = self.engine.launch(targets)?;
        Ok(self.collect(run, cancel, &targets.join(" ")).await)
    }

    /// One engine launch per target; workers report over a channel to a
    /// single collector.
    async fn scan_fan_out(
        &self,
        cancel: &CancellationToken,
        targets: Vec<String>,
        max_parallel: usize,
    ) -> ScanResult<Vec<ScanRecord>> {
        let total = targets.len();
        let permits = Arc::new(Semaphore::new(max_parallel));
        let (tx, mut rx) = mpsc::channel::<(String, ScanResult<Vec<ScanRecord>>)>(total);

        for target in targets {
            let driver = self.clone();
            let cancel = cancel.clone();
            let permits = Arc::clone(&permits);
            let tx = tx.clone();

            tokio::spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) if !cancel.is_cancelled() => {
                        info!(scan_target = %target, "starting scan for target");
                        driver.scan_batch(&cancel, std::slice::from_ref(&target)).await
                    }
                    _ => Ok(Vec::new()),
                };
                let _ = tx.send((target, result)).await;
            });
        }
        drop(tx);

        let mut records = Vec::new();
        let mut errors = Vec::new();
        while let Some((target, result)) = rx.recv().await {
            match result {
                Ok(batch) => records.extend(batch),
                Err(e) => {
                    error!(scan_target = %target, error = %e, "scan error");
                    errors.push(ScanError::Target {
                        target,
                        source: Box::new(e),
                    });
                }
            }
        }

        if errors.len() == total {
            // Nothing ran at all; surface the first failure.
            return Err(errors.remove(0));
        }

        Ok(records)
    }

    /// Read one engine's output to completion, cancellation, or deadline.
    async fn collect(&self, run: EngineRun, cancel: &CancellationToken, label: &str) -> Vec<ScanRecord> {
        let EngineRun { output, mut handle } = run;
        let mut frames = FramedRead::new(output, JsonArrayCodec::new(self.options.max_element_len));
        let deadline = self.options.scan_timeout.map(|t| Instant::now() + t);

        let mut records = Vec::new();
        let mut stats = DecodeStats::default();

        let reason = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break StopReason::Cancelled,
                _ = sleep_until(deadline) => break StopReason::DeadlineReached,
                frame = frames.next() => frame,
            };

            match next {
                None => break StopReason::Finished,
                Some(Ok(frame)) => {
                    match decode_frame(frame) {
                        Ok(event) => {
                            stats.hosts += 1;
                            records.extend(event.into_records(Utc::now()));
                        }
                        Err(e) => {
                            stats.skipped += 1;
                            warn!(targets = label, error = %e, "skipping undecodable host object");
                        }
                    }
                }
                Some(Err(CodecError::NotAnArray(byte))) => {
                    warn!(targets = label, first_byte = byte, "no scan output");
                    break StopReason::Unreadable;
                }
                Some(Err(CodecError::Io(e))) => {
                    warn!(targets = label, error = %e, "failed reading scan output");
                    break StopReason::Unreadable;
                }
            }
        };

        if reason == StopReason::Finished && !frames.decoder().opened() {
            // Filtered hosts, zero open ports, or an early abort all look alike.
            warn!(targets = label, "no scan output");
        }

        let exit = match reason {
            StopReason::Finished => handle.wait().await,
            StopReason::Cancelled | StopReason::DeadlineReached | StopReason::Unreadable => {
                if reason == StopReason::DeadlineReached {
                    warn!(targets = label, "scan deadline reached, terminating engine");
                } else if reason == StopReason::Cancelled {
                    info!(targets = label, "scan cancelled, terminating engine");
                }
                handle.terminate().await
            }
        };

        match exit {
            Ok(EngineExit::Exited(Some(0))) | Ok(EngineExit::Terminated) => {}
            Ok(EngineExit::Exited(code)) => {
                warn!(targets = label, exit_code = ?code, "scan engine exited abnormally")
            }
            Err(e) => warn!(targets = label, error = %e, "failed to reap scan engine"),
        }

        debug!(
            targets = label,
            hosts = stats.hosts,
            skipped = stats.skipped,
            open_ports = records.len(),
            "engine output consumed"
        );
        records
    }
}

fn decode_frame(frame: Frame) -> Result<RawScanEvent, DecodeError> {
    match frame {
        Frame::Element(bytes) => RawScanEvent::decode(&bytes),
        Frame::Oversized(len) => Err(DecodeError::Oversized(len)),
        Frame::Truncated(len) => Err(DecodeError::Truncated(len)),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
