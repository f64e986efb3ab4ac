//! Scan record persistence.
//!
//! Keeps the last-known state of every open port, keyed by
//! `(host, port, protocol)`, in a SQLite table.

mod sqlite_store;

pub use sqlite_store::ScanStore;

use crate::error::StorageResult;
use crate::types::{ScanRecord, Snapshot};
use async_trait::async_trait;

/// Durable keyed table of last-known port state.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load every stored record. Empty on first run.
    async fn load_all(&self) -> StorageResult<Snapshot>;

    /// Insert or update each record in one transaction, returning how many
    /// were saved. Rejected records are logged and skipped.
    async fn upsert(&self, records: &[ScanRecord]) -> StorageResult<usize>;
}
