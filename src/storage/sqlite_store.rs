//! SQLite-backed scan record store.

use super::RecordStore;
use crate::error::{StorageError, StorageResult};
use crate::types::{Port, ScanRecord, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS scan_results (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    ip         TEXT    NOT NULL CHECK (ip <> ''),
    port       INTEGER NOT NULL,
    proto      TEXT    NOT NULL CHECK (proto <> ''),
    banner     TEXT    DEFAULT '',
    first_seen DATETIME NOT NULL,
    last_seen  DATETIME NOT NULL,
    UNIQUE(ip, port, proto)
)
"#;

// An empty incoming banner never overwrites a stored one.
const UPSERT: &str = r#"
INSERT INTO scan_results (ip, port, proto, banner, first_seen, last_seen)
VALUES (?1, ?2, ?3, ?4, ?5, ?5)
ON CONFLICT(ip, port, proto) DO UPDATE SET
    last_seen = excluded.last_seen,
    banner = CASE
        WHEN excluded.banner <> '' THEN excluded.banner
        ELSE scan_results.banner
    END
"#;

const SELECT_ALL: &str =
    "SELECT ip, port, proto, banner, first_seen, last_seen FROM scan_results";

#[derive(Debug, sqlx::FromRow)]
struct ScanRow {
    ip: String,
    port: i64,
    proto: String,
    banner: Option<String>,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl ScanRow {
    fn into_record(self) -> StorageResult<ScanRecord> {
        let port = Port::from_wide(self.port).ok_or_else(|| StorageError::Corrupt {
            key: format!("{}:{}/{}", self.ip, self.port, self.proto),
            reason: "port out of range".to_string(),
        })?;

        Ok(ScanRecord {
            host: self.ip,
            port,
            protocol: self.proto,
            banner: self.banner.unwrap_or_default(),
            first_seen: self.first_seen,
            last_seen: self.last_seen,
        })
    }
}

/// Scan records in a single SQLite table.
#[derive(Debug, Clone)]
pub struct ScanStore {
    pool: SqlitePool,
    location: String,
}

impl ScanStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let location = path.display().to_string();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|source| StorageError::Open {
                path: location.clone(),
                source,
            })?;

        let store = Self { pool, location };
        store.migrate().await?;
        info!(path = %store.location, "opened scan database");
        Ok(store)
    }

    /// A private database that lives as long as the store.
    pub async fn in_memory() -> StorageResult<Self> {
        let location = "sqlite::memory:".to_string();
        let options = SqliteConnectOptions::from_str(&location).map_err(|source| {
            StorageError::Open {
                path: location.clone(),
                source,
            }
        })?;

        // The database disappears with its last connection, so pin one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|source| StorageError::Open {
                path: location.clone(),
                source,
            })?;

        let store = Self { pool, location };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> StorageResult<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Schema)?;
        Ok(())
    }

    /// Where the database lives.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
        debug!(path = %self.location, "closed scan database");
    }

    /// Path form of [`ScanStore::location`] for file-backed stores.
    pub fn path(&self) -> Option<PathBuf> {
        (!self.location.starts_with("sqlite:")).then(|| PathBuf::from(&self.location))
    }
}

#[async_trait]
impl RecordStore for ScanStore {
    async fn load_all(&self) -> StorageResult<Snapshot> {
        let rows: Vec<ScanRow> = sqlx::query_as(SELECT_ALL)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Query)?;

        let snapshot = rows
            .into_iter()
            .map(ScanRow::into_record)
            .collect::<StorageResult<Snapshot>>()?;

        debug!(records = snapshot.len(), "loaded previous state");
        Ok(snapshot)
    }

    async fn upsert(&self, records: &[ScanRecord]) -> StorageResult<usize> {
        let mut tx = self.pool.begin().await.map_err(StorageError::Begin)?;
        let now = Utc::now();
        let mut saved = 0usize;

        for record in records {
            let result = sqlx::query(UPSERT)
                .bind(&record.host)
                .bind(i64::from(record.port.as_u16()))
                .bind(&record.protocol)
                .bind(&record.banner)
                .bind(now)
                .execute(&mut *tx)
                .await;

            match result {
                Ok(_) => saved += 1,
                Err(e) => warn!(record = %record.key(), error = %e, "skipping record"),
            }
        }

        tx.commit().await.map_err(StorageError::Commit)?;
        debug!(saved, total = records.len(), "persisted scan records");
        Ok(saved)
    }
}
