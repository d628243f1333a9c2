//! Usage counters per credential.
//!
//! Updates are deltas merged by addition, so two writers recording requests
//! independently never lose each other's counts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counters for one key id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyUsage {
    #[serde(default)]
    pub requests: u64,
    #[serde(default)]
    pub errors: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Requests counted on `usage_day` (UTC), for daily limits.
    #[serde(default)]
    pub requests_today: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_day: Option<NaiveDate>,
}

impl KeyUsage {
    fn merge(self, other: KeyUsage) -> KeyUsage {
        // A newer day resets the daily counter; the same day adds.
        let (requests_today, usage_day) = match (self.usage_day, other.usage_day) {
            (Some(a), Some(b)) if a == b => (self.requests_today + other.requests_today, Some(a)),
            (Some(a), Some(b)) if a > b => (self.requests_today, Some(a)),
            (Some(_), Some(b)) => (other.requests_today, Some(b)),
            (Some(a), None) => (self.requests_today, Some(a)),
            (None, Some(b)) => (other.requests_today, Some(b)),
            (None, None) => (self.requests_today + other.requests_today, None),
        };

        KeyUsage {
            requests: self.requests.saturating_add(other.requests),
            errors: self.errors.saturating_add(other.errors),
            last_used_at: latest(self.last_used_at, other.last_used_at),
            requests_today,
            usage_day,
        }
    }

    /// Requests made on `day`; zero if the stored counter belongs to another day.
    pub fn requests_on(&self, day: NaiveDate) -> u64 {
        if self.usage_day == Some(day) {
            self.requests_today
        } else {
            0
        }
    }
}

fn latest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Usage metrics record. Also used as the delta passed to `update_metrics`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetrics {
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub usage_by_key: BTreeMap<String, KeyUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl UsageMetrics {
    /// Delta for one request made with `key_id`.
    pub fn request(key_id: &str, success: bool, now: DateTime<Utc>) -> Self {
        let errors = u64::from(!success);
        let mut usage_by_key = BTreeMap::new();
        usage_by_key.insert(
            key_id.to_string(),
            KeyUsage {
                requests: 1,
                errors,
                last_used_at: Some(now),
                requests_today: 1,
                usage_day: Some(now.date_naive()),
            },
        );
        Self { total_requests: 1, error_count: errors, usage_by_key, last_used_at: Some(now) }
    }

    /// Additive merge: counters sum, per-key counters sum per key, and
    /// `last_used_at` keeps the most recent timestamp.
    pub fn merge(mut self, delta: UsageMetrics) -> Self {
        self.total_requests = self.total_requests.saturating_add(delta.total_requests);
        self.error_count = self.error_count.saturating_add(delta.error_count);
        self.last_used_at = latest(self.last_used_at, delta.last_used_at);
        for (key_id, usage) in delta.usage_by_key {
            let merged = match self.usage_by_key.remove(&key_id) {
                Some(existing) => existing.merge(usage),
                None => usage,
            };
            self.usage_by_key.insert(key_id, merged);
        }
        self
    }

    pub fn requests_today(&self, key_id: &str, day: NaiveDate) -> u64 {
        self.usage_by_key.get(key_id).map(|u| u.requests_on(day)).unwrap_or(0)
    }
}
