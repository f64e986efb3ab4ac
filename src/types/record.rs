//! Observed open ports and the persisted snapshot they form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::Port;

/// Identity of one logical service across scans: `(host, port, protocol)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub host: String,
    pub port: Port,
    pub protocol: String,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.protocol)
    }
}

/// One observed open port on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Host address as reported by the scan engine.
    pub host: String,
    pub port: Port,
    /// Transport protocol, e.g. "tcp" or "udp".
    pub protocol: String,
    /// Service banner; empty when the service produced none.
    #[serde(default)]
    pub banner: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl ScanRecord {
    /// Create a record observed at `seen`, with no banner.
    pub fn new(host: impl Into<String>, port: Port, protocol: impl Into<String>, seen: DateTime<Utc>) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: protocol.into(),
            banner: String::new(),
            first_seen: seen,
            last_seen: seen,
        }
    }

    /// Set the banner.
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = banner.into();
        self
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            host: self.host.clone(),
            port: self.port,
            protocol: self.protocol.clone(),
        }
    }

    pub fn has_banner(&self) -> bool {
        !self.banner.is_empty()
    }
}

/// All ports known open as of the last persisted scan, keyed by identity.
///
/// Iteration order is key order, which keeps reconciliation output stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: BTreeMap<RecordKey, ScanRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any record with the same key.
    pub fn insert(&mut self, record: ScanRecord) -> Option<ScanRecord> {
        self.records.insert(record.key(), record)
    }

    pub fn get(&self, key: &RecordKey) -> Option<&ScanRecord> {
        self.records.get(key)
    }

    pub fn contains_key(&self, key: &RecordKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RecordKey, &ScanRecord)> {
        self.records.iter()
    }

    pub fn records(&self) -> impl Iterator<Item = &ScanRecord> {
        self.records.values()
    }
}

impl FromIterator<ScanRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = ScanRecord>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}
