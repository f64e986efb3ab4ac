//! # portwatch - Open-Port Change Monitoring
//!
//! portwatch runs [masscan](https://github.com/robertdavidgraham/masscan)
//! against a set of targets, reconciles the open ports it finds with the
//! previous scan, persists the new state in SQLite and reports what
//! changed.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use portwatch::pipeline::Pipeline;
//! use portwatch::scanner::{ReplayEngine, ScanDriver};
//! use portwatch::storage::ScanStore;
//! use portwatch::types::TargetSpec;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(ScanStore::in_memory().await.unwrap());
//!     let engine = ReplayEngine::from_file("scan.json".as_ref()).unwrap();
//!     let driver = ScanDriver::new(Arc::new(engine));
//!     let targets = vec![TargetSpec::parse("192.168.1.0/24").unwrap()];
//!
//!     let pipeline = Pipeline::new(store, driver, targets);
//!     let summary = pipeline.run_once(&CancellationToken::new()).await.unwrap();
//!     println!("{} new, {} closed", summary.new, summary.closed);
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - Core type definitions with newtype patterns for type safety
//! - [`scanner`] - Scan engines and the streaming scan driver
//! - [`storage`] - SQLite store of last-known port state
//! - [`diff`] - Reconciliation of a scan against the stored state
//! - [`pipeline`] - One load, scan, reconcile, persist and notify cycle
//! - [`scheduler`] - Fixed-interval, single-flight task loop
//! - [`notify`] - Change notifications
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`output`] - Output formatting utilities

pub mod cli;
pub mod config;
pub mod diff;
pub mod error;
pub mod notify;
pub mod output;
pub mod pipeline;
pub mod scanner;
pub mod scheduler;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use diff::{compare, DiffResult};
pub use error::{PipelineError, ScanError, StartupError, StorageError};
pub use pipeline::{Pipeline, RunSummary};
pub use scanner::{MasscanEngine, ReplayEngine, ScanDriver, ScanEngine};
pub use scheduler::{Scheduler, SchedulerReport, SchedulerState};
pub use storage::{RecordStore, ScanStore};
pub use types::{Port, PortSpec, RunId, ScanRecord, Snapshot, TargetSpec};
