//! Run subcommand implementation.
//!
//! Handles `portwatch run`: one scan, or scans on an interval until a
//! shutdown signal arrives.

use crate::config::{parse_duration, Settings};
use crate::error::{ConfigError, ConfigResult, StartupError, StartupResult};
use crate::notify::{SmtpNotifier, TelegramNotifier};
use crate::output::{self, ConsoleReporter};
use crate::pipeline::Pipeline;
use crate::scanner::{MasscanEngine, ReplayEngine, ScanDriver, ScanEngine};
use crate::scheduler::Scheduler;
use crate::storage::ScanStore;
use crate::types::TargetSpec;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Scan the configured targets.
#[derive(Parser, Debug)]
pub struct RunCommand {
    /// Run a single scan even if the scheduler is enabled
    #[arg(long)]
    pub once: bool,

    /// Scan on this interval (e.g. "30m", "2h"), overriding the config
    #[arg(short, long, value_parser = parse_interval, conflicts_with = "once")]
    pub interval: Option<Duration>,

    /// Replay captured masscan JSON output instead of scanning
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    /// Do not send notifications
    #[arg(long)]
    pub no_notify: bool,
}

impl RunCommand {
    /// Execute the run command. Returns once the scan, or the schedule,
    /// is finished.
    pub async fn execute(
        &self,
        settings: &Settings,
        quiet: bool,
        cancel: CancellationToken,
    ) -> StartupResult<()> {
        let engine = self.engine(settings)?;
        if settings.targets.is_empty() {
            output::print_warning("No targets configured; every scan will fail until some are added.");
        }
        let hosts = total_host_count(&settings.targets);
        let store = ScanStore::open(&settings.database_path()?).await?;

        let driver = ScanDriver::new(engine).with_options(settings.masscan.driver_options());
        let mut pipeline = Pipeline::new(
            Arc::new(store.clone()),
            driver,
            settings.targets.clone(),
        )
        .with_reporter(ConsoleReporter::new().quiet(quiet));

        if self.no_notify {
            info!("notifications disabled");
        } else {
            if let Some(telegram) = TelegramNotifier::from_settings(&settings.telegram)? {
                info!("telegram notifier enabled");
                pipeline = pipeline.with_notifier(Box::new(telegram));
            }
            if let Some(smtp) = SmtpNotifier::from_settings(&settings.smtp)? {
                info!(host = %settings.smtp.host, "mail notifier enabled");
                pipeline = pipeline.with_notifier(Box::new(smtp));
            }
        }

        match self.schedule(settings) {
            Some(interval) => {
                info!(
                    interval = %humantime::format_duration(interval),
                    targets = pipeline.targets().len(),
                    hosts,
                    "scheduler mode"
                );
                let report = Scheduler::new(interval, pipeline).run(&cancel).await;
                if report.failures > 0 {
                    warn!(runs = report.runs, failures = report.failures, "some runs failed");
                }
            }
            None => {
                info!(targets = pipeline.targets().len(), hosts, "single scan mode");
                match pipeline.run_once(&cancel).await {
                    Ok(summary) if !quiet => output::print_success(&format!(
                        "Scan finished: {} open, {} new, {} changed, {} closed",
                        summary.open_ports, summary.new, summary.changed, summary.closed
                    )),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "run failed"),
                }
            }
        }

        store.close().await;
        Ok(())
    }

    fn engine(&self, settings: &Settings) -> StartupResult<Arc<dyn ScanEngine>> {
        if let Some(path) = &self.replay {
            let engine = ReplayEngine::from_file(path).map_err(|source| StartupError::Replay {
                path: path.clone(),
                source,
            })?;
            output::print_info(&format!("Replaying scan output from {}", path.display()));
            return Ok(Arc::new(engine));
        }

        if !is_root() {
            return Err(StartupError::NotRoot);
        }
        Ok(Arc::new(MasscanEngine::from_settings(&settings.masscan)))
    }

    /// The interval to schedule on, or `None` for a single run.
    fn schedule(&self, settings: &Settings) -> Option<Duration> {
        if self.once {
            return None;
        }
        match self.interval {
            Some(interval) => Some(interval),
            None if settings.scheduler.enabled => Some(settings.scheduler.interval),
            None => None,
        }
    }
}

fn total_host_count(targets: &[TargetSpec]) -> u128 {
    targets
        .iter()
        .fold(0u128, |acc, t| acc.saturating_add(t.estimated_host_count()))
}

fn parse_interval(raw: &str) -> ConfigResult<Duration> {
    let interval = parse_duration("--interval", raw)?;
    if interval.is_zero() {
        return Err(ConfigError::Invalid(
            "--interval must be greater than zero".to_string(),
        ));
    }
    Ok(interval)
}

/// Check if running with root privileges.
fn is_root() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}
