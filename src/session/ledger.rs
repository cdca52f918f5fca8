use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How many records the live status shows.
pub const LIVE_RECORDS: usize = 10;
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedRecord {
    pub name: String,
    pub size_bytes: u64,
    /// Unix seconds.
    pub completed_at: u64,
    pub duration_seconds: f64,
}

/// History of finished transfers, oldest first.
#[derive(Debug, Clone)]
pub struct CompletedLedger {
    records: Vec<CompletedRecord>,
    retention: Duration,
}

impl CompletedLedger {
    pub fn new(retention: Duration) -> Self {
        Self {
            records: Vec::new(),
            retention,
        }
    }

    /// Rebuilds a ledger from persisted records, dropping those already past retention.
    pub fn from_records(
        mut records: Vec<CompletedRecord>,
        retention: Duration,
        now_unix_secs: u64,
    ) -> Self {
        records.sort_by_key(|r| r.completed_at);
        let mut ledger = Self { records, retention };
        ledger.evict_expired(now_unix_secs);
        ledger
    }

    pub fn push(&mut self, record: CompletedRecord) {
        self.records.push(record);
    }

    /// The `n` most recent records, oldest first.
    pub fn recent(&self, n: usize) -> &[CompletedRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    /// Drops records whose age reached the retention window. Returns how many went.
    pub fn evict_expired(&mut self, now_unix_secs: u64) -> usize {
        let retention = self.retention.as_secs();
        let before = self.records.len();
        self.records
            .retain(|r| now_unix_secs.saturating_sub(r.completed_at) < retention);
        before - self.records.len()
    }

    /// Removes every record with this name.
    pub fn remove_named(&mut self, name: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.name != name);
        before != self.records.len()
    }

    pub fn records(&self) -> &[CompletedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
