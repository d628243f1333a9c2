//! Groq account rotation and daily quotas.
//!
//! An account is available when its health is not `unhealthy` and today's
//! request count is below its daily limit. Accounts without a limit are
//! unlimited. Selection walks the account list cyclically from a start
//! index and takes the first available account.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::bundle::{GroqAccount, SecretBundle};
use super::state::{HealthLevel, RotationState};
use super::usage::UsageMetrics;

/// Quota and health snapshot for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyQuota {
    pub id: String,
    pub daily_limit: Option<u64>,
    pub requests_today: u64,
    /// `None` when the account has no limit.
    pub remaining: Option<u64>,
    pub health: HealthLevel,
    pub available: bool,
    pub active: bool,
}

/// Read-only view over the records needed to pick an account.
#[derive(Debug, Clone, Copy)]
pub struct KeyRotator<'a> {
    bundle: &'a SecretBundle,
    state: &'a RotationState,
    metrics: &'a UsageMetrics,
    today: NaiveDate,
}

impl<'a> KeyRotator<'a> {
    pub fn new(
        bundle: &'a SecretBundle,
        state: &'a RotationState,
        metrics: &'a UsageMetrics,
        today: NaiveDate,
    ) -> Self {
        Self { bundle, state, metrics, today }
    }

    fn accounts(&self) -> &'a [GroqAccount] {
        &self.bundle.groq.accounts
    }

    pub fn requests_today(&self, account: &GroqAccount) -> u64 {
        self.metrics.requests_today(&account.id, self.today)
    }

    pub fn is_available(&self, account: &GroqAccount) -> bool {
        let healthy = self.state.key_health(&account.id).is_usable();
        let under_limit =
            account.daily_limit.map_or(true, |limit| self.requests_today(account) < limit);
        healthy && under_limit
    }

    /// Position of the active account, if it still exists.
    pub fn active_index(&self) -> Option<usize> {
        let active = self.state.active_key.as_deref()?;
        self.accounts().iter().position(|a| a.id == active)
    }

    /// First available account at or after `start`, wrapping around.
    pub fn select_from(&self, start: usize) -> Option<(usize, &'a GroqAccount)> {
        let accounts = self.accounts();
        let len = accounts.len();
        if len == 0 {
            return None;
        }
        let start = start % len;
        (0..len)
            .map(|offset| (start + offset) % len)
            .map(|index| (index, &accounts[index]))
            .find(|(_, account)| self.is_available(account))
    }

    /// Selection starting at the stored rotation index.
    pub fn select(&self) -> Option<(usize, &'a GroqAccount)> {
        self.select_from(self.state.rotation_index)
    }

    /// Next available account after the active one. The active account is
    /// only returned again when it is the only one available. Without an
    /// active account this is [`select`](Self::select).
    pub fn next_after_active(&self) -> Option<(usize, &'a GroqAccount)> {
        match self.active_index() {
            Some(active) => self.select_from(active.saturating_add(1)),
            None => self.select(),
        }
    }

    pub fn quota(&self) -> Vec<KeyQuota> {
        let active = self.active_index();
        self.accounts()
            .iter()
            .enumerate()
            .map(|(index, account)| {
                let requests_today = self.requests_today(account);
                KeyQuota {
                    id: account.id.clone(),
                    daily_limit: account.daily_limit,
                    requests_today,
                    remaining: account.daily_limit.map(|l| l.saturating_sub(requests_today)),
                    health: self.state.key_health(&account.id).status,
                    available: self.is_available(account),
                    active: active == Some(index),
                }
            })
            .collect()
    }
}
