//! Provider credential client.
//!
//! [`VaultClient`] is the single entry point for credentials, rotation state
//! and usage metrics. Every read follows the same chain:
//!
//! 1. in-memory TTL cache
//! 2. remote KV store, with retry
//! 3. encrypted fallback file
//! 4. environment variables (credentials only)
//! 5. empty default
//!
//! Reads never fail because a backend is down. Writes go to the remote store
//! and land in the fallback file when the remote cannot take them; they fail
//! only when both refuse.
//!
//! # Example
//!
//! ```rust,ignore
//! use provider_vault::secrets::{Provider, VaultClient};
//!
//! let client = VaultClient::from_env()?;
//! let key = client.get_key(Provider::Groq).await;
//! client.record_usage("groq-1", true, None).await?;
//! ```

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn, Instrument};

use super::bundle::{FlatKeys, Provider, SecretBundle, SecretPayload};
use super::cache::{CacheKey, CachedValue, TtlCache};
use super::env::EnvKeys;
use super::error::{Result, SecretsError};
use super::fallback::EncryptedFileStore;
use super::reload::AutoReload;
use super::remote::VaultKvStore;
use super::retry::{RetryPolicy, RetryingStore};
use super::rotation::{KeyQuota, KeyRotator};
use super::state::{HealthStatus, RotationState, RotationStatePatch};
use super::store::{DataSource, Record, SecretStore};
use super::usage::UsageMetrics;
use crate::config::ClientSettings;
use crate::secrets_span;

/// Serializes read-modify-write cycles per record.
#[derive(Default)]
struct RecordLocks {
    keys: Mutex<()>,
    state: Mutex<()>,
    metrics: Mutex<()>,
}

impl RecordLocks {
    fn get(&self, record: Record) -> &Mutex<()> {
        match record {
            Record::Keys => &self.keys,
            Record::State => &self.state,
            Record::Metrics => &self.metrics,
        }
    }
}

/// Credential, rotation and usage client with layered fallback.
pub struct VaultClient {
    settings: ClientSettings,
    remote: Option<RetryingStore<Arc<dyn SecretStore>>>,
    fallback: Arc<EncryptedFileStore>,
    env: EnvKeys,
    cache: TtlCache<CacheKey, CachedValue>,
    locks: RecordLocks,
    reload: StdMutex<Option<AutoReload>>,
}

impl VaultClient {
    /// Build a client from validated settings. The remote store is enabled
    /// only when an address is configured.
    pub fn new(settings: ClientSettings) -> Result<Self> {
        settings.validate().map_err(|e| SecretsError::config_error(e.to_string()))?;

        let remote: Option<Arc<dyn SecretStore>> = if settings.vault.is_remote_enabled() {
            Some(Arc::new(VaultKvStore::new(&settings.vault)?))
        } else {
            info!("No Vault address configured, using local fallback only");
            None
        };
        let fallback = Arc::new(EncryptedFileStore::new(&settings.fallback));

        Ok(Self::with_stores(settings, remote, fallback, EnvKeys::new()))
    }

    /// Build a client from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientSettings::from_env())
    }

    /// Build a shared client and start auto-reload when it is enabled.
    pub fn shared(settings: ClientSettings) -> Result<Arc<Self>> {
        let reload = settings.reload.clone();
        let client = Arc::new(Self::new(settings)?);
        if reload.enabled {
            client.start_auto_reload(reload.interval());
        }
        Ok(client)
    }

    /// Assemble a client from explicit backends.
    pub fn with_stores(
        settings: ClientSettings,
        remote: Option<Arc<dyn SecretStore>>,
        fallback: Arc<EncryptedFileStore>,
        env: EnvKeys,
    ) -> Self {
        let policy = RetryPolicy::from(&settings.retry);
        Self {
            cache: TtlCache::new(settings.cache.ttl()),
            remote: remote.map(|store| RetryingStore::new(store, policy)),
            fallback,
            env,
            locks: RecordLocks::default(),
            reload: StdMutex::new(None),
            settings,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    // ------------------------------------------------------------------
    // Read chain
    // ------------------------------------------------------------------

    async fn resolve_local(&self, record: Record) -> (Option<Value>, DataSource) {
        if let Some(value) = self.fallback.read_record(record).await {
            return (Some(value), DataSource::Fallback);
        }
        match self.env.read(record).await {
            Ok(Some(value)) => (Some(value), DataSource::Environment),
            Ok(None) => (None, DataSource::Default),
            Err(e) => {
                warn!(record = %record, error = %e, "Failed to read environment credentials");
                (None, DataSource::Default)
            }
        }
    }

    async fn resolve(&self, record: Record) -> (Option<Value>, DataSource) {
        if let Some(remote) = &self.remote {
            match remote.read(record).await {
                Ok(Some(value)) => return (Some(value), DataSource::Remote),
                Ok(None) => debug!(record = %record, "Record not present in Vault"),
                Err(e) => {
                    warn!(record = %record, error = %e, "Vault read failed, trying local fallback")
                }
            }
        }
        self.resolve_local(record).await
    }

    fn parse_bundle(value: Option<Value>, source: DataSource) -> SecretBundle {
        let Some(value) = value else {
            return SecretBundle::default();
        };
        match SecretPayload::from_value(value) {
            Ok(payload) => payload.normalize(),
            Err(e) => {
                warn!(source = %source, error = %e, "Discarding malformed credential payload");
                SecretBundle::default()
            }
        }
    }

    fn parse_record<T: DeserializeOwned + Default>(
        record: Record,
        value: Option<Value>,
        source: DataSource,
    ) -> T {
        match value.map(serde_json::from_value::<T>) {
            Some(Ok(parsed)) => parsed,
            Some(Err(e)) => {
                warn!(record = %record, source = %source, error = %e, "Discarding malformed record");
                T::default()
            }
            None => T::default(),
        }
    }

    async fn load_bundle_uncached(&self) -> SecretBundle {
        let (value, source) = self.resolve(Record::Keys).await;
        debug!(source = %source, "Resolved credential bundle");
        Self::parse_bundle(value, source)
    }

    async fn load_state_uncached(&self) -> RotationState {
        let (value, source) = self.resolve(Record::State).await;
        Self::parse_record(Record::State, value, source)
    }

    async fn load_metrics_uncached(&self) -> UsageMetrics {
        let (value, source) = self.resolve(Record::Metrics).await;
        Self::parse_record(Record::Metrics, value, source)
    }

    async fn cache_bundle(&self, bundle: &SecretBundle) {
        self.cache.set(CacheKey::SecretsPayload, CachedValue::Payload(bundle.clone())).await;
        self.cache.set(CacheKey::Keys, CachedValue::Keys(bundle.flatten())).await;
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Store a record remotely, or in the fallback file when the remote
    /// store is missing or refuses the write.
    async fn persist(&self, record: Record, value: &Value) -> Result<DataSource> {
        let mut remote_error = None;
        if let Some(remote) = &self.remote {
            match remote.write(record, value).await {
                Ok(()) => return Ok(DataSource::Remote),
                Err(e) => {
                    warn!(record = %record, error = %e, "Vault write failed, writing local fallback");
                    remote_error = Some(e);
                }
            }
        }

        match self.fallback.write_record(record, value).await {
            Ok(()) => Ok(DataSource::Fallback),
            Err(e) => {
                error!(
                    record = %record,
                    remote_error = ?remote_error.map(|e| e.to_string()),
                    fallback_error = %e,
                    "Failed to persist record"
                );
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------

    /// Normalized credential bundle.
    pub async fn get_bundle(&self) -> SecretBundle {
        if let Some(CachedValue::Payload(bundle)) = self.cache.get(&CacheKey::SecretsPayload).await
        {
            return bundle;
        }
        let bundle = self.load_bundle_uncached().await;
        self.cache_bundle(&bundle).await;
        bundle
    }

    /// Flat key view of the credential bundle.
    pub async fn get_keys(&self) -> FlatKeys {
        if let Some(CachedValue::Keys(keys)) = self.cache.get(&CacheKey::Keys).await {
            return keys;
        }
        let keys = self.get_bundle().await.flatten();
        self.cache.set(CacheKey::Keys, CachedValue::Keys(keys.clone())).await;
        keys
    }

    /// Key to use for `provider` right now.
    ///
    /// For Groq this is the active account from rotation state when it still
    /// exists, otherwise the first available account, otherwise the first
    /// account.
    pub async fn get_key(&self, provider: Provider) -> Option<String> {
        let bundle = self.get_bundle().await;
        if provider == Provider::Mistral {
            return bundle.first_key(provider).map(str::to_string);
        }
        if bundle.groq.accounts.is_empty() {
            return None;
        }

        let state = self.load_state().await;
        if let Some(account) = state.active_key.as_deref().and_then(|id| bundle.account(id)) {
            return Some(account.key.clone());
        }

        let metrics = self.load_metrics().await;
        let rotator = KeyRotator::new(&bundle, &state, &metrics, Utc::now().date_naive());
        rotator
            .select()
            .map(|(_, account)| account.key.clone())
            .or_else(|| bundle.first_key(provider).map(str::to_string))
    }

    /// Add or replace a credential and persist the bundle.
    pub async fn save_key(
        &self,
        provider: Provider,
        key: &str,
        id: Option<&str>,
        daily_limit: Option<u64>,
    ) -> Result<SecretBundle> {
        let key = key.trim();
        if key.is_empty() {
            return Err(SecretsError::invalid_value("Credential cannot be empty"));
        }

        let span = secrets_span!("save_key", Record::Keys);
        async {
            let _guard = self.locks.get(Record::Keys).lock().await;

            let mut bundle = self.load_bundle_uncached().await;
            let account_id = bundle.apply(provider, key, id, daily_limit);

            let source = self.persist(Record::Keys, &serde_json::to_value(&bundle)?).await?;
            self.cache_bundle(&bundle).await;

            info!(
                provider = %provider,
                account_id = account_id.as_deref().unwrap_or("-"),
                source = %source,
                "Saved provider credential"
            );
            Ok(bundle)
        }
        .instrument(span)
        .await
    }

    /// Re-read credentials, bypassing the cache.
    ///
    /// With a remote store configured, its errors are returned instead of
    /// falling back, so the caller can tell a refresh did not happen.
    pub async fn refresh_keys_cache(&self) -> Result<FlatKeys> {
        let bundle = match &self.remote {
            Some(remote) => match remote.read(Record::Keys).await? {
                Some(value) => Self::parse_bundle(Some(value), DataSource::Remote),
                None => {
                    let (value, source) = self.resolve_local(Record::Keys).await;
                    Self::parse_bundle(value, source)
                }
            },
            None => self.load_bundle_uncached().await,
        };

        self.cache_bundle(&bundle).await;
        debug!(accounts = bundle.groq.accounts.len(), "Refreshed credential cache");
        Ok(bundle.flatten())
    }

    /// Refresh used by the auto-reload task. Failures are logged and dropped.
    pub async fn background_refresh(&self) {
        if let Err(e) = self.refresh_keys_cache().await {
            warn!(error = %e, "Background credential refresh failed");
        }
    }

    // ------------------------------------------------------------------
    // Rotation state
    // ------------------------------------------------------------------

    pub async fn load_state(&self) -> RotationState {
        if let Some(CachedValue::State(state)) = self.cache.get(&CacheKey::State).await {
            return state;
        }
        let state = self.load_state_uncached().await;
        self.cache.set(CacheKey::State, CachedValue::State(state.clone())).await;
        state
    }

    /// Persist `state` stamped with the write time.
    async fn store_state(&self, state: RotationState) -> Result<RotationState> {
        let state = state.touch(Utc::now());
        self.persist(Record::State, &serde_json::to_value(&state)?).await?;
        self.cache.set(CacheKey::State, CachedValue::State(state.clone())).await;
        Ok(state)
    }

    /// Replace the rotation state.
    pub async fn save_state(&self, state: RotationState) -> Result<RotationState> {
        let _guard = self.locks.get(Record::State).lock().await;
        self.store_state(state).await
    }

    /// Merge `patch` into the stored rotation state.
    pub async fn update_rotation_state(&self, patch: RotationStatePatch) -> Result<RotationState> {
        let span = secrets_span!("update_rotation_state", Record::State);
        async {
            let _guard = self.locks.get(Record::State).lock().await;
            let state = self.load_state_uncached().await.merge(patch, Utc::now());
            self.store_state(state).await
        }
        .instrument(span)
        .await
    }

    // ------------------------------------------------------------------
    // Usage metrics
    // ------------------------------------------------------------------

    pub async fn load_metrics(&self) -> UsageMetrics {
        if let Some(CachedValue::Metrics(metrics)) = self.cache.get(&CacheKey::Metrics).await {
            return metrics;
        }
        let metrics = self.load_metrics_uncached().await;
        self.cache.set(CacheKey::Metrics, CachedValue::Metrics(metrics.clone())).await;
        metrics
    }

    /// Add `delta` to the stored metrics.
    pub async fn update_metrics(&self, delta: UsageMetrics) -> Result<UsageMetrics> {
        let span = secrets_span!("update_metrics", Record::Metrics);
        async {
            let _guard = self.locks.get(Record::Metrics).lock().await;
            let metrics = self.load_metrics_uncached().await.merge(delta);
            self.persist(Record::Metrics, &serde_json::to_value(&metrics)?).await?;
            self.cache.set(CacheKey::Metrics, CachedValue::Metrics(metrics.clone())).await;
            Ok(metrics)
        }
        .instrument(span)
        .await
    }

    // ------------------------------------------------------------------
    // Rotation
    // ------------------------------------------------------------------

    /// Record one request made with `key_id` and update that key's health.
    pub async fn record_usage(
        &self,
        key_id: &str,
        success: bool,
        error_message: Option<&str>,
    ) -> Result<HealthStatus> {
        let now = Utc::now();
        self.update_metrics(UsageMetrics::request(key_id, success, now)).await?;
        let bundle = self.get_bundle().await;

        let _guard = self.locks.get(Record::State).lock().await;
        let mut state = self.load_state_uncached().await;
        for account in &bundle.groq.accounts {
            state.key_health.entry(account.id.clone()).or_default();
        }
        let mut health = state.key_health(key_id);
        if success {
            health.record_success(now);
        } else {
            health.record_failure(now, error_message, self.settings.rotation.failure_threshold);
            state.failure_count = state.failure_count.saturating_add(1);
            debug!(key_id, status = %health.status, errors = health.error_count, "Key failure recorded");
        }
        state.key_health.insert(key_id.to_string(), health.clone());
        state.refresh_overall_health(now);

        self.store_state(state).await?;
        Ok(health)
    }

    /// Move to the next available Groq account. Returns its id, or `None`
    /// when no account is available.
    pub async fn rotate_key(&self) -> Result<Option<String>> {
        let bundle = self.get_bundle().await;
        let metrics = self.load_metrics().await;

        let _guard = self.locks.get(Record::State).lock().await;
        let mut state = self.load_state_uncached().await;
        let now = Utc::now();

        let next = KeyRotator::new(&bundle, &state, &metrics, now.date_naive())
            .next_after_active()
            .map(|(index, account)| (index, account.id.clone()));

        let Some((index, id)) = next else {
            warn!(accounts = bundle.groq.accounts.len(), "No Groq account available for rotation");
            return Ok(None);
        };

        let previous = state.active_key.replace(id.clone());
        state.rotation_index = index;
        state.last_rotated_at = Some(now);
        state.failure_count = 0;
        self.store_state(state).await?;

        info!(from = previous.as_deref().unwrap_or("-"), to = %id, "Rotated Groq key");
        Ok(Some(id))
    }

    /// Quota and health for every Groq account.
    pub async fn quota_status(&self) -> Vec<KeyQuota> {
        let bundle = self.get_bundle().await;
        let state = self.load_state().await;
        let metrics = self.load_metrics().await;
        KeyRotator::new(&bundle, &state, &metrics, Utc::now().date_naive()).quota()
    }

    // ------------------------------------------------------------------
    // Cache and auto-reload
    // ------------------------------------------------------------------

    pub async fn invalidate_cache(&self) {
        self.cache.clear().await;
    }

    fn reload_slot(&self) -> std::sync::MutexGuard<'_, Option<AutoReload>> {
        self.reload.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Refresh credentials every `interval` in the background. Replaces a
    /// running refresh task.
    pub fn start_auto_reload(self: &Arc<Self>, interval: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let task = AutoReload::spawn(interval, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(client) => {
                        client.background_refresh().await;
                        true
                    }
                    None => false,
                }
            }
        });

        if let Some(previous) = self.reload_slot().replace(task) {
            previous.stop();
        }
    }

    /// Stop the background refresh. Does nothing when none is running.
    pub fn stop_auto_reload(&self) {
        if let Some(task) = self.reload_slot().take() {
            task.stop();
        }
    }

    pub fn is_auto_reloading(&self) -> bool {
        self.reload_slot().as_ref().is_some_and(AutoReload::is_running)
    }
}
