//! Exponential backoff around remote store calls.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::Result;
use super::store::{DataSource, Record, SecretStore};
use crate::config::RetrySettings;

/// Retry policy: `max_retries + 1` attempts, sleeping `base_delay * 2^n`
/// after failed attempt `n`.
///
/// Errors that are not [`retryable`](super::SecretsError::is_retryable) end
/// the loop immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay: Duration::from_millis(500) }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(settings.max_retries, Duration::from_millis(settings.base_delay_ms))
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self { max_retries, base_delay }
    }

    /// Delay after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The last error is returned.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt, "Remote call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Remote call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(operation, attempts = attempt + 1, error = %e, "Remote call failed");
                    return Err(e);
                }
            }
        }
    }
}

/// Wraps a store so every read and write goes through a [`RetryPolicy`].
pub struct RetryingStore<S: SecretStore> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: SecretStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl<S: SecretStore> SecretStore for RetryingStore<S> {
    fn source(&self) -> DataSource {
        self.inner.source()
    }

    async fn read(&self, record: Record) -> Result<Option<Value>> {
        self.policy.run(&format!("read {}", record), || self.inner.read(record)).await
    }

    async fn write(&self, record: Record, value: &Value) -> Result<()> {
        self.policy.run(&format!("write {}", record), || self.inner.write(record, value)).await
    }
}
