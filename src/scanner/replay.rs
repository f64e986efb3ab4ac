//! Replay engine.
//!
//! Streams canned scan-engine output instead of running a scan. Used for
//! dry runs from a captured `-oJ` file and for exercising the driver's
//! decoding and cancellation paths without the real binary.

use crate::error::{ScanError, ScanResult};
use crate::scanner::traits::{EngineExit, EngineHandle, EngineRun, ScanEngine};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

/// Scan engine that replays recorded output.
#[derive(Debug, Clone, Default)]
pub struct ReplayEngine {
    chunks: Vec<Bytes>,
    per_target: HashMap<String, Vec<Bytes>>,
    failing: HashSet<String>,
    chunk_delay: Duration,
    hold_open: bool,
    launches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl ReplayEngine {
    /// Replay `output` as a single chunk.
    pub fn new(output: impl Into<Bytes>) -> Self {
        Self::from_chunks(vec![output.into()])
    }

    /// Replay `chunks` one write at a time.
    pub fn from_chunks(chunks: Vec<Bytes>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }

    /// Replay a captured output file.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        Ok(Self::new(std::fs::read(path)?))
    }

    /// Use different output when a launch covers exactly `target`.
    pub fn with_target_output(mut self, target: impl Into<String>, output: impl Into<Bytes>) -> Self {
        self.per_target.insert(target.into(), vec![output.into()]);
        self
    }

    /// Make launches that include `target` fail to start.
    pub fn with_failing_target(mut self, target: impl Into<String>) -> Self {
        self.failing.insert(target.into());
        self
    }

    /// Pause before each chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Keep the stream open after the last chunk, like a process that hangs.
    pub fn holding_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Target batches of every launch so far.
    pub fn launches(&self) -> Vec<Vec<String>> {
        self.launches
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl ScanEngine for ReplayEngine {
    fn name(&self) -> &str {
        "replay"
    }

    fn launch(&self, targets: &[String]) -> ScanResult<EngineRun> {
        if let Ok(mut launches) = self.launches.lock() {
            launches.push(targets.to_vec());
        }

        if let Some(target) = targets.iter().find(|t| self.failing.contains(*t)) {
            return Err(ScanError::Launch {
                binary: format!("replay:{}", target),
                source: io::Error::new(io::ErrorKind::NotFound, "simulated launch failure"),
            });
        }

        let chunks = match targets {
            [single] => self.per_target.get(single).unwrap_or(&self.chunks).clone(),
            _ => self.chunks.clone(),
        };
        let delay = self.chunk_delay;
        let hold_open = self.hold_open;

        let (mut writer, reader) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(async move {
            for chunk in chunks {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if writer.write_all(&chunk).await.is_err() {
                    return;
                }
            }
            if hold_open {
                std::future::pending::<()>().await;
            }
        });

        Ok(EngineRun {
            output: Box::new(reader),
            handle: Box::new(ReplayHandle { task }),
        })
    }
}

struct ReplayHandle {
    task: JoinHandle<()>,
}

#[async_trait]
impl EngineHandle for ReplayHandle {
    async fn wait(&mut self) -> io::Result<EngineExit> {
        match (&mut self.task).await {
            Ok(()) => Ok(EngineExit::Exited(Some(0))),
            Err(e) if e.is_cancelled() => Ok(EngineExit::Terminated),
            Err(e) => Err(io::Error::other(e)),
        }
    }

    async fn terminate(&mut self) -> io::Result<EngineExit> {
        self.task.abort();
        let _ = (&mut self.task).await;
        Ok(EngineExit::Terminated)
    }
}
