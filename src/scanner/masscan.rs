//! Masscan process engine.
//!
//! Launches one `masscan` process per invocation with JSON output on stdout.
//! Children are spawned with `kill_on_drop`.

use crate::config::MasscanSettings;
use crate::error::{ScanError, ScanResult};
use crate::scanner::traits::{EngineExit, EngineHandle, EngineRun, ScanEngine};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Scan engine backed by the `masscan` binary.
#[derive(Debug, Clone)]
pub struct MasscanEngine {
    binary: PathBuf,
    rate: u32,
    ports: String,
    interface: Option<String>,
    kill_grace: Duration,
}

impl MasscanEngine {
    /// Create an engine for `binary` scanning `ports` at `rate` packets/s.
    pub fn new(binary: impl Into<PathBuf>, rate: u32, ports: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            rate,
            ports: ports.into(),
            interface: None,
            kill_grace: Duration::from_secs(5),
        }
    }

    /// Build an engine from the `[masscan]` config section.
    pub fn from_settings(settings: &MasscanSettings) -> Self {
        let engine = Self::new(settings.binary.clone(), settings.rate, settings.ports.to_string())
            .with_kill_grace(settings.kill_grace);
        match settings.interface.as_deref() {
            Some(iface) if !iface.is_empty() => engine.with_interface(iface),
            _ => engine,
        }
    }

    /// Set the network interface.
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// How long to wait for a killed process to be reaped.
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Command-line arguments for one invocation.
    pub fn arguments(&self, targets: &[String]) -> Vec<String> {
        let mut args = vec![
            "-oJ".to_string(),
            "-".to_string(),
            "--banners".to_string(),
            "--rate".to_string(),
            self.rate.to_string(),
            "-p".to_string(),
            self.ports.clone(),
        ];

        if let Some(iface) = &self.interface {
            args.push("-e".to_string());
            args.push(iface.clone());
        }

        args.extend(targets.iter().cloned());
        args
    }
}

impl ScanEngine for MasscanEngine {
    fn name(&self) -> &str {
        "masscan"
    }

    fn launch(&self, targets: &[String]) -> ScanResult<EngineRun> {
        let args = self.arguments(targets);
        info!(binary = %self.binary.display(), args = %args.join(" "), "starting masscan");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ScanError::Launch {
                binary: self.binary.display().to_string(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ScanError::MissingOutput(self.binary.display().to_string()))?;

        // masscan reports progress and warnings on stderr.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let line = line.trim();
                    if !line.is_empty() {
                        debug!(target: "portwatch::masscan", "{}", line);
                    }
                }
            });
        }

        Ok(EngineRun {
            output: Box::new(stdout),
            handle: Box::new(ProcessHandle {
                child,
                kill_grace: self.kill_grace,
            }),
        })
    }
}

/// Handle over a spawned child process.
struct ProcessHandle {
    child: Child,
    kill_grace: Duration,
}

#[async_trait]
impl EngineHandle for ProcessHandle {
    async fn wait(&mut self) -> io::Result<EngineExit> {
        let status = self.child.wait().await?;
        Ok(EngineExit::Exited(status.code()))
    }

    async fn terminate(&mut self) -> io::Result<EngineExit> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(EngineExit::Exited(status.code()));
        }

        self.child.start_kill()?;
        match tokio::time::timeout(self.kill_grace, self.child.wait()).await {
            Ok(status) => {
                status?;
                Ok(EngineExit::Terminated)
            }
            Err(_) => {
                warn!(
                    grace_ms = self.kill_grace.as_millis() as u64,
                    "scan process not reaped within grace period"
                );
                Ok(EngineExit::Terminated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_batch_all_targets() {
        let engine = MasscanEngine::new("masscan", 1000, "1-1000");
        let args = engine.arguments(&["10.0.0.0/24".to_string(), "10.0.1.5".to_string()]);
        assert_eq!(
            args,
            vec![
                "-oJ", "-", "--banners", "--rate", "1000", "-p", "1-1000", "10.0.0.0/24",
                "10.0.1.5"
            ]
        );
    }

    #[test]
    fn test_arguments_with_interface() {
        let engine = MasscanEngine::new("masscan", 500, "22,U:53").with_interface("eth1");
        let args = engine.arguments(&["192.168.1.1".to_string()]);
        assert_eq!(&args[5..], ["-p", "22,U:53", "-e", "eth1", "192.168.1.1"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_error() {
        let engine = MasscanEngine::new("/nonexistent/portwatch-test/masscan", 100, "80");
        let err = engine.launch(&["127.0.0.1".to_string()]).unwrap_err();
        assert!(matches!(err, ScanError::Launch { .. }));
    }
}
