//! Per-channel fetch failure bookkeeping.
//!
//! A channel's failure record is created on its first consecutive failure
//! and removed on its next success. The timestamp of an existing record is
//! never moved forward, so `erroring_since` always marks the start of the
//! current failure streak.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::model::normalize_name;

/// A channel that has been failing since `erroring_since`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailingChannel {
    pub name: String,
    pub erroring_since: DateTime<Utc>,
}

/// Failure records for one platform, keyed by normalized channel name.
#[derive(Debug, Default)]
pub struct FailureTracker {
    records: DashMap<String, DateTime<Utc>>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure now. Keeps the first timestamp of a streak.
    pub fn record_failure(&self, name: &str) {
        self.record_failure_at(name, Utc::now());
    }

    /// Record a failure at a given time. Keeps the first timestamp of a streak.
    pub fn record_failure_at(&self, name: &str, at: DateTime<Utc>) {
        let name = normalize_name(name);
        self.records.entry(name).or_insert_with(|| {
            debug!(at = %at, "channel started failing");
            at
        });
    }

    /// Record a success, ending any failure streak.
    pub fn record_success(&self, name: &str) {
        self.records.remove(&normalize_name(name));
    }

    /// Remove the record without a success (used after eviction).
    pub fn clear(&self, name: &str) {
        self.records.remove(&normalize_name(name));
    }

    pub fn erroring_since(&self, name: &str) -> Option<DateTime<Utc>> {
        self.records.get(&normalize_name(name)).map(|r| *r.value())
    }

    pub fn failing(&self) -> Vec<FailingChannel> {
        self.records
            .iter()
            .map(|entry| FailingChannel {
                name: entry.key().clone(),
                erroring_since: *entry.value(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
