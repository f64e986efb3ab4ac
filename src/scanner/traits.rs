//! Scan engine trait abstraction.
//!
//! The scanning itself is done by an external engine that streams a JSON
//! array of host objects. This trait hides how that stream is produced so the
//! driver's decoding and cancellation logic can run against the real process
//! or a canned replay alike.

use crate::error::ScanResult;
use async_trait::async_trait;
use std::io;
use tokio::io::AsyncRead;

/// Output stream of a launched engine.
pub type EngineOutput = Box<dyn AsyncRead + Send + Unpin>;

/// How a launched engine finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineExit {
    /// Exited on its own with the given code (None if killed by a signal).
    Exited(Option<i32>),
    /// Terminated by the driver.
    Terminated,
}

/// Lifecycle control for one launched engine.
#[async_trait]
pub trait EngineHandle: Send {
    /// Wait for the engine to finish on its own.
    async fn wait(&mut self) -> io::Result<EngineExit>;

    /// Forcibly stop the engine and reap it.
    async fn terminate(&mut self) -> io::Result<EngineExit>;
}

/// A running engine: its output plus a handle to control it.
pub struct EngineRun {
    pub output: EngineOutput,
    pub handle: Box<dyn EngineHandle>,
}

impl std::fmt::Debug for EngineRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRun").finish_non_exhaustive()
    }
}

/// Trait for scan engine implementations.
///
/// # Example
///
/// ```ignore
/// use portwatch::scanner::{ScanEngine, ReplayEngine};
///
/// let engine = ReplayEngine::new(r#"[{"ip":"10.0.0.1","ports":[]}]"#);
/// let run = engine.launch(&["10.0.0.1".to_string()])?;
/// ```
pub trait ScanEngine: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Start one engine invocation covering all `targets`.
    ///
    /// Failure to start is a hard failure for the scan and is never retried.
    fn launch(&self, targets: &[String]) -> ScanResult<EngineRun>;
}
