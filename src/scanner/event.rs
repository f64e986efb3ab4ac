//! Host objects emitted by the scan engine.
//!
//! Shape: `{ip, timestamp, ports:[{port, proto, status, reason, ttl,
//! service:{name, banner}}]}`. Only entries whose status is exactly `"open"`
//! become [`ScanRecord`]s.

use crate::error::DecodeError;
use crate::types::{Port, ScanRecord};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

/// One decoded host object.
#[derive(Debug, Clone, Deserialize)]
pub struct RawScanEvent {
    pub ip: String,
    /// Unix seconds, as a string.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub ports: Vec<RawPortEntry>,
}

/// One per-port entry of a host object.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPortEntry {
    pub port: i64,
    #[serde(default)]
    pub proto: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub service: Option<RawService>,
}

/// Service identification attached to a port entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawService {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub banner: String,
}

impl RawPortEntry {
    pub fn is_open(&self) -> bool {
        self.status == "open"
    }

    fn banner(&self) -> &str {
        self.service.as_ref().map_or("", |s| s.banner.as_str())
    }
}

impl RawScanEvent {
    /// Decode one element frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// When the engine observed this host, if it said so.
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        let secs: i64 = self.timestamp.as_deref()?.trim().parse().ok()?;
        DateTime::from_timestamp(secs, 0)
    }

    /// Promote every open port entry to a record.
    ///
    /// `fallback` is used as the observation time when the host object
    /// carries no usable timestamp.
    pub fn into_records(self, fallback: DateTime<Utc>) -> Vec<ScanRecord> {
        let seen = self.observed_at().unwrap_or(fallback);
        let ip = self.ip;

        self.ports
            .into_iter()
            .filter(RawPortEntry::is_open)
            .filter_map(|entry| {
                let Some(port) = Port::from_wide(entry.port) else {
                    debug!(host = %ip, port = entry.port, "skipping entry with invalid port");
                    return None;
                };
                let banner = entry.banner().to_string();
                Some(ScanRecord::new(ip.clone(), port, entry.proto, seen).with_banner(banner))
            })
            .collect()
    }
}
