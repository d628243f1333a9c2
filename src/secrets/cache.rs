//! In-memory TTL cache for resolved records.
//!
//! Entries expire `ttl` after insertion and are evicted lazily when read.
//! There is no background sweep.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::bundle::{FlatKeys, SecretBundle};
use super::state::RotationState;
use super::usage::UsageMetrics;

/// Logical cache slots used by the vault client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Keys,
    State,
    Metrics,
    SecretsPayload,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CacheKey::Keys => "keys",
            CacheKey::State => "state",
            CacheKey::Metrics => "metrics",
            CacheKey::SecretsPayload => "secrets-payload",
        };
        write!(f, "{}", s)
    }
}

/// Values stored by the vault client.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Keys(FlatKeys),
    Payload(SecretBundle),
    State(RotationState),
    Metrics(UsageMetrics),
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// TTL cache keyed by `K`.
///
/// Time comes from `tokio::time`, so paused-clock tests can step across the
/// expiry boundary.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self { entries: RwLock::new(HashMap::new()), ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value if present and not past its expiry.
    pub async fn get(&self, key: &K) -> Option<V> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if Instant::now() <= entry.expires_at => {
                    debug!(key = %key, "Cache hit");
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| Instant::now() > entry.expires_at) {
            entries.remove(key);
            debug!(key = %key, "Cache entry expired");
        }
        None
    }

    pub async fn set(&self, key: K, value: V) {
        let expires_at = Instant::now() + self.ttl;
        debug!(key = %key, ttl_ms = self.ttl.as_millis() as u64, "Caching record");
        self.entries.write().await.insert(key, CacheEntry { value, expires_at });
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        debug!(count = entries.len(), "Clearing cache");
        entries.clear();
    }

    /// Number of stored entries, expired ones included until next read.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
