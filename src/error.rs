//! Error types for portwatch.
//!
//! Uses `thiserror` for ergonomic error definitions. The pipeline
//! coordinator is the only place that decides whether an error ends a run;
//! everything below it reports and lets the caller choose.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::PortError;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine a home directory for config and data files")]
    DirectoryNotFound,

    #[error("failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    InvalidFormat {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid duration '{value}' for {field}: {source}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid port specification: {0}")]
    Ports(#[from] PortError),
}

/// Errors raised by the scan record store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to open database {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to create schema: {0}")]
    Schema(#[source] sqlx::Error),

    #[error("failed to query scan records: {0}")]
    Query(#[source] sqlx::Error),

    #[error("failed to begin transaction: {0}")]
    Begin(#[source] sqlx::Error),

    #[error("failed to commit transaction: {0}")]
    Commit(#[source] sqlx::Error),

    #[error("corrupt scan record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("failed to create database directory: {0}")]
    Directory(#[from] std::io::Error),
}

/// Errors that end a single scan invocation.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("no targets specified")]
    NoTargets,

    #[error("failed to start scan engine '{binary}': {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("scan engine '{0}' did not expose its standard output")]
    MissingOutput(String),

    #[error("target {target}: {source}")]
    Target {
        target: String,
        #[source]
        source: Box<ScanError>,
    },
}

/// A single scan-engine output element that could not be used.
///
/// Always recoverable: the element is skipped and decoding continues.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed host object: {0}")]
    Json(#[from] serde_json::Error),

    #[error("host object of {0} bytes exceeds the element size limit")]
    Oversized(usize),

    #[error("output ended inside a host object ({0} bytes)")]
    Truncated(usize),
}

/// Errors raised by notification collaborators.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("invalid mail address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("cancelled before delivery")]
    Cancelled,
}

/// Errors that abort one pipeline run.
///
/// Persist and notify failures never appear here; they are logged inside
/// the run and the run still completes.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("load previous state: {0}")]
    LoadSnapshot(#[source] StorageError),

    #[error("scan: {0}")]
    Scan(#[source] ScanError),
}

/// Fatal errors raised before scheduling starts.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("notifier: {0}")]
    Notifier(#[from] NotifyError),

    #[error("cannot read replay file {path}: {source}")]
    Replay {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("masscan requires raw socket access; run as root (or use --replay)")]
    NotRoot,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Result type alias for CLI entry points.
pub type StartupResult<T> = Result<T, StartupError>;
