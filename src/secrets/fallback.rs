//! Encrypted local fallback file.
//!
//! Used when the remote store is unreachable or not configured. The file
//! holds one AES-256-GCM envelope per record:
//!
//! ```text
//! { "version": 1, "updatedAt": "...", "salt": "<hex>",
//!   "records": { "keys": {"iv","tag","data"}, "state": {...}, "metrics": {...} } }
//! ```
//!
//! Each envelope is bound to its record name as AAD, so an envelope moved
//! to another slot fails authentication.
//!
//! Reads never fail: an absent file, a corrupt file, a wrong secret or a
//! tampered envelope all read as "no data". [`EncryptedFileStore::inspect_record`]
//! keeps the distinction for callers that care.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::crypto::{self, DerivedKey, Envelope};
use super::error::{Result, SecretsError};
use super::store::{DataSource, Record, SecretStore};
use super::types::SecretString;
use crate::config::FallbackSettings;

const STORAGE_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredRecords {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    keys: Option<Envelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<Envelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metrics: Option<Envelope>,
}

impl StoredRecords {
    fn get(&self, record: Record) -> Option<&Envelope> {
        match record {
            Record::Keys => self.keys.as_ref(),
            Record::State => self.state.as_ref(),
            Record::Metrics => self.metrics.as_ref(),
        }
    }

    fn set(&mut self, record: Record, envelope: Envelope) {
        let slot = match record {
            Record::Keys => &mut self.keys,
            Record::State => &mut self.state,
            Record::Metrics => &mut self.metrics,
        };
        *slot = Some(envelope);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageFile {
    version: u32,
    updated_at: DateTime<Utc>,
    salt: String,
    #[serde(default)]
    records: StoredRecords,
}

/// Outcome of reading one record from the fallback file.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackRead {
    Found(Value),
    /// No file, or the file holds nothing for this record.
    Missing,
    /// Something is stored but could not be read back.
    Undecryptable(String),
}

/// File-backed store with per-record encryption.
pub struct EncryptedFileStore {
    path: PathBuf,
    secret: Option<SecretString>,
    iterations: NonZeroU32,
    write_lock: Mutex<()>,
    derived: Mutex<Option<(Vec<u8>, DerivedKey)>>,
}

impl EncryptedFileStore {
    pub fn new(settings: &FallbackSettings) -> Self {
        Self {
            path: settings.path.clone(),
            secret: settings.secret.clone().filter(|s| !s.is_empty()),
            iterations: NonZeroU32::new(settings.kdf_iterations).unwrap_or(NonZeroU32::MIN),
            write_lock: Mutex::new(()),
            derived: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// Derive the key for `salt`, reusing the last derivation when the salt
    /// has not changed.
    async fn key_for(&self, secret: &SecretString, salt: &[u8]) -> Result<DerivedKey> {
        let mut derived = self.derived.lock().await;
        if let Some((cached_salt, key)) = derived.as_ref() {
            if cached_salt.as_slice() == salt {
                return Ok(key.clone());
            }
        }

        let secret = secret.clone();
        let salt_owned = salt.to_vec();
        let iterations = self.iterations;
        let key = tokio::task::spawn_blocking(move || {
            crypto::derive_key(secret.expose_secret(), &salt_owned, iterations)
        })
        .await
        .map_err(|e| SecretsError::internal(format!("Key derivation task failed: {}", e)))?;

        *derived = Some((salt.to_vec(), key.clone()));
        Ok(key)
    }

    async fn load_file(&self) -> std::result::Result<Option<StorageFile>, String> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read fallback file: {}", e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| format!("failed to parse fallback file: {}", e))
    }

    /// Read and classify one record.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn inspect_record(&self, record: Record) -> FallbackRead {
        let file = match self.load_file().await {
            Ok(Some(file)) => file,
            Ok(None) => return FallbackRead::Missing,
            Err(reason) => return FallbackRead::Undecryptable(reason),
        };
        let Some(envelope) = file.records.get(record) else {
            return FallbackRead::Missing;
        };
        let Some(secret) = &self.secret else {
            return FallbackRead::Undecryptable("no fallback secret configured".to_string());
        };

        let salt = match hex::decode(&file.salt) {
            Ok(salt) => salt,
            Err(e) => return FallbackRead::Undecryptable(format!("invalid salt: {}", e)),
        };

        let decoded = async {
            let key = self.key_for(secret, &salt).await?;
            let plaintext = crypto::open(&key, record.as_str().as_bytes(), envelope)?;
            Ok::<Value, SecretsError>(serde_json::from_slice(&plaintext)?)
        }
        .await;

        match decoded {
            Ok(value) => FallbackRead::Found(value),
            Err(e) => FallbackRead::Undecryptable(e.to_string()),
        }
    }

    /// Decrypted record, or `None` for anything short of a clean read.
    pub async fn read_record(&self, record: Record) -> Option<Value> {
        match self.inspect_record(record).await {
            FallbackRead::Found(value) => {
                debug!(record = %record, "Loaded record from fallback file");
                Some(value)
            }
            FallbackRead::Missing => None,
            FallbackRead::Undecryptable(reason) => {
                warn!(record = %record, reason = %reason, "Ignoring unreadable fallback record");
                None
            }
        }
    }

    /// Encrypt and store one record, leaving the others untouched.
    #[instrument(skip(self, value), fields(path = %self.path.display()))]
    pub async fn write_record(&self, record: Record, value: &Value) -> Result<()> {
        let secret = self.secret.as_ref().ok_or_else(|| {
            SecretsError::config_error("Fallback encryption secret is not configured")
        })?;

        let _guard = self.write_lock.lock().await;

        let mut file = match self.load_file().await {
            Ok(Some(file)) => file,
            Ok(None) => self.new_file()?,
            Err(reason) => {
                warn!(reason = %reason, "Replacing unreadable fallback file");
                self.new_file()?
            }
        };

        let salt = hex::decode(&file.salt)
            .map_err(|e| SecretsError::crypto(format!("Invalid salt in fallback file: {}", e)))?;
        let key = self.key_for(secret, &salt).await?;
        let envelope = crypto::seal(&key, record.as_str().as_bytes(), &serde_json::to_vec(value)?)?;

        file.records.set(record, envelope);
        file.updated_at = Utc::now();
        file.version = STORAGE_VERSION;

        self.persist(&file).await?;
        debug!(record = %record, "Stored record in fallback file");
        Ok(())
    }

    fn new_file(&self) -> Result<StorageFile> {
        info!(path = %self.path.display(), "Initializing fallback file");
        Ok(StorageFile {
            version: STORAGE_VERSION,
            updated_at: Utc::now(),
            salt: hex::encode(crypto::generate_salt()?),
            records: StoredRecords::default(),
        })
    }

    async fn persist(&self, file: &StorageFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, serde_json::to_vec_pretty(file)?).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SecretStore for EncryptedFileStore {
    fn source(&self) -> DataSource {
        DataSource::Fallback
    }

    async fn read(&self, record: Record) -> Result<Option<Value>> {
        Ok(self.read_record(record).await)
    }

    async fn write(&self, record: Record, value: &Value) -> Result<()> {
        self.write_record(record, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(dir: &TempDir, secret: Option<&str>) -> EncryptedFileStore {
        EncryptedFileStore::new(&FallbackSettings {
            path: dir.path().join("nested").join("vault.json"),
            secret: secret.map(SecretString::new),
            kdf_iterations: 10,
        })
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_missing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, Some("s"));
        assert_eq!(store.inspect_record(Record::Keys).await, FallbackRead::Missing);
        assert_eq!(store.read_record(Record::Keys).await, None);
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, Some("s"));
        let value = json!({"groqApiKey1": "abc"});

        store.write_record(Record::Keys, &value).await.unwrap();
        assert_eq!(store.read_record(Record::Keys).await, Some(value));
        assert_eq!(store.inspect_record(Record::State).await, FallbackRead::Missing);
    }

    #[tokio::test]
    async fn test_write_without_secret_fails() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, None);
        let err = store.write_record(Record::Keys, &json!({})).await.unwrap_err();
        assert!(matches!(err, SecretsError::ConfigError { .. }));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_undecryptable() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, Some("s"));
        tokio::fs::create_dir_all(store.path().parent().unwrap()).await.unwrap();
        tokio::fs::write(store.path(), b"not json").await.unwrap();

        assert!(matches!(
            store.inspect_record(Record::Keys).await,
            FallbackRead::Undecryptable(_)
        ));
        assert_eq!(store.read_record(Record::Keys).await, None);

        // A write recovers the file.
        store.write_record(Record::Keys, &json!({"a": 1})).await.unwrap();
        assert_eq!(store.read_record(Record::Keys).await, Some(json!({"a": 1})));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = store(&dir, Some("s"));
        store.write_record(Record::State, &json!({})).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
