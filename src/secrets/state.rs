//! Rotation state: which credential is active and how healthy each one is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Overall health level of a key or of the rotation as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthLevel::Healthy => "healthy",
            HealthLevel::Degraded => "degraded",
            HealthLevel::Unhealthy => "unhealthy",
        };
        write!(f, "{}", s)
    }
}

/// Health record with timestamps and error counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    #[serde(default)]
    pub status: HealthLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl HealthStatus {
    /// A successful call restores the key to healthy and clears the streak.
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.status = HealthLevel::Healthy;
        self.error_count = 0;
        self.last_checked_at = Some(now);
    }

    /// Count a failure. The first failure degrades, `threshold` consecutive
    /// failures make the key unhealthy.
    pub fn record_failure(&mut self, now: DateTime<Utc>, error: Option<&str>, threshold: u32) {
        self.error_count = self.error_count.saturating_add(1);
        self.last_checked_at = Some(now);
        self.last_error_at = Some(now);
        if let Some(error) = error {
            self.last_error = Some(error.to_string());
        }
        self.status = if self.error_count >= threshold.max(1) {
            HealthLevel::Unhealthy
        } else {
            HealthLevel::Degraded
        };
    }

    pub fn is_usable(&self) -> bool {
        self.status != HealthLevel::Unhealthy
    }
}

/// Persisted rotation state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rotated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_loaded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default)]
    pub rotation_index: usize,
    #[serde(default)]
    pub health_status: HealthStatus,
    #[serde(default)]
    pub key_health: BTreeMap<String, HealthStatus>,
}

/// Partial update applied by `update_rotation_state`.
///
/// Absent fields keep their previous value. `key_health` entries replace the
/// entry with the same key id and leave other ids alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationStatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rotated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_status: Option<HealthStatus>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub key_health: BTreeMap<String, HealthStatus>,
}

impl RotationState {
    /// Apply a patch over this state and stamp `last_loaded_at`.
    pub fn merge(mut self, patch: RotationStatePatch, now: DateTime<Utc>) -> Self {
        if let Some(active_key) = patch.active_key {
            self.active_key = Some(active_key);
        }
        if let Some(at) = patch.last_rotated_at {
            self.last_rotated_at = Some(at);
        }
        if let Some(count) = patch.failure_count {
            self.failure_count = count;
        }
        if let Some(index) = patch.rotation_index {
            self.rotation_index = index;
        }
        if let Some(health) = patch.health_status {
            self.health_status = health;
        }
        self.key_health.extend(patch.key_health);
        self.touch(now)
    }

    /// Stamp `last_loaded_at` with the write time.
    pub fn touch(mut self, now: DateTime<Utc>) -> Self {
        self.last_loaded_at = Some(now);
        self
    }

    pub fn key_health(&self, key_id: &str) -> HealthStatus {
        self.key_health.get(key_id).cloned().unwrap_or_default()
    }

    /// Recompute the overall status from the per-key map: unhealthy when no
    /// key is usable, degraded when any key is degraded or unhealthy.
    pub fn refresh_overall_health(&mut self, now: DateTime<Utc>) {
        let levels: Vec<HealthLevel> = self.key_health.values().map(|h| h.status).collect();
        self.health_status.status = if !levels.is_empty()
            && levels.iter().all(|l| *l == HealthLevel::Unhealthy)
        {
            HealthLevel::Unhealthy
        } else if levels.iter().any(|l| *l != HealthLevel::Healthy) {
            HealthLevel::Degraded
        } else {
            HealthLevel::Healthy
        };
        self.health_status.last_checked_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn populated() -> RotationState {
        let mut key_health = BTreeMap::new();
        key_health.insert(
            "groq-1".to_string(),
            HealthStatus { status: HealthLevel::Degraded, error_count: 2, ..Default::default() },
        );
        RotationState {
            active_key: Some("groq-1".to_string()),
            last_rotated_at: Some(at(0)),
            last_loaded_at: Some(at(0)),
            failure_count: 0,
            rotation_index: 1,
            health_status: HealthStatus::default(),
            key_health,
        }
    }

    #[test]
    fn test_merge_is_shallow_override() {
        let before = populated();
        let patch = RotationStatePatch { failure_count: Some(1), ..Default::default() };

        let after = before.clone().merge(patch, at(60));

        assert_eq!(after.failure_count, 1);
        assert_eq!(after.last_loaded_at, Some(at(60)));
        assert_eq!(after.active_key, before.active_key);
        assert_eq!(after.key_health, before.key_health);
        assert_eq!(after.rotation_index, before.rotation_index);
        assert_eq!(after.last_rotated_at, before.last_rotated_at);
    }

    #[test]
    fn test_merge_key_health_per_id() {
        let mut patch = RotationStatePatch::default();
        patch.key_health.insert("groq-2".to_string(), HealthStatus::default());

        let after = populated().merge(patch, at(1));
        assert_eq!(after.key_health.len(), 2);
        assert_eq!(after.key_health["groq-1"].status, HealthLevel::Degraded);
        assert_eq!(after.key_health["groq-2"].status, HealthLevel::Healthy);
    }

    #[test]
    fn test_health_transitions() {
        let mut health = HealthStatus::default();
        health.record_failure(at(1), Some("429 Too Many Requests"), 3);
        assert_eq!(health.status, HealthLevel::Degraded);
        health.record_failure(at(2), None, 3);
        health.record_failure(at(3), None, 3);
        assert_eq!(health.status, HealthLevel::Unhealthy);
        assert_eq!(health.error_count, 3);
        assert_eq!(health.last_error.as_deref(), Some("429 Too Many Requests"));
        assert!(!health.is_usable());

        health.record_success(at(4));
        assert_eq!(health.status, HealthLevel::Healthy);
        assert_eq!(health.error_count, 0);
        assert_eq!(health.last_error_at, Some(at(3)));
    }

    #[test]
    fn test_overall_health() {
        let mut state = RotationState::default();
        state.refresh_overall_health(at(0));
        assert_eq!(state.health_status.status, HealthLevel::Healthy);

        state.key_health.insert(
            "a".into(),
            HealthStatus { status: HealthLevel::Unhealthy, ..Default::default() },
        );
        state.key_health.insert("b".into(), HealthStatus::default());
        state.refresh_overall_health(at(1));
        assert_eq!(state.health_status.status, HealthLevel::Degraded);

        state.key_health.get_mut("b").unwrap().status = HealthLevel::Unhealthy;
        state.refresh_overall_health(at(2));
        assert_eq!(state.health_status.status, HealthLevel::Unhealthy);
    }

    #[test]
    fn test_state_json_field_names() {
        let json = serde_json::to_value(populated()).unwrap();
        assert_eq!(json["activeKey"], "groq-1");
        assert_eq!(json["rotationIndex"], 1);
        assert_eq!(json["keyHealth"]["groq-1"]["status"], "degraded");
        assert_eq!(json["healthStatus"]["status"], "healthy");
    }
}
