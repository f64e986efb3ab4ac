//! Reconciliation of a fresh scan against the previous snapshot.

use crate::types::{RecordKey, ScanRecord, Snapshot};
use std::collections::HashSet;

/// Outcome of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// Keys seen now but never before.
    pub new: Vec<ScanRecord>,
    /// Keys seen before whose banner is now different and non-empty.
    pub changed: Vec<ScanRecord>,
    /// Keys seen before but missing from this scan. These carry the
    /// previously stored record.
    pub closed: Vec<ScanRecord>,
}

impl DiffResult {
    /// True when nothing was opened, changed or closed.
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.changed.is_empty() && self.closed.is_empty()
    }

    /// Total number of classified records.
    pub fn len(&self) -> usize {
        self.new.len() + self.changed.len() + self.closed.len()
    }
}

/// Classify `fresh` against `prior`.
///
/// `new` and `changed` keep the order of `fresh`; `closed` follows the
/// snapshot's key order. A fresh record with an empty banner is never
/// reported as changed. When `fresh` repeats a key, only its first
/// occurrence is classified.
pub fn compare(fresh: &[ScanRecord], prior: &Snapshot) -> DiffResult {
    let mut result = DiffResult::default();
    let mut seen: HashSet<RecordKey> = HashSet::with_capacity(fresh.len());

    for record in fresh {
        let key = record.key();
        if seen.contains(&key) {
            continue;
        }
        match prior.get(&key) {
            None => result.new.push(record.clone()),
            Some(previous) if record.has_banner() && record.banner != previous.banner => {
                result.changed.push(record.clone())
            }
            Some(_) => {}
        }
        seen.insert(key);
    }

    result.closed = prior
        .iter()
        .filter(|(key, _)| !seen.contains(*key))
        .map(|(_, record)| record.clone())
        .collect();

    result
}
