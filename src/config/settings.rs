//! # Configuration Settings
//!
//! Defines the configuration structure for the provider vault client.

use crate::errors::{Error, Result};
use crate::secrets::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok()).unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|s| {
            let s = s.trim().to_lowercase();
            s == "true" || s == "1" || s == "yes"
        })
        .unwrap_or(default)
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Complete client configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct ClientSettings {
    /// Remote secrets store
    #[validate(nested)]
    pub vault: VaultSettings,

    /// Retry policy for remote calls
    #[validate(nested)]
    pub retry: RetrySettings,

    /// In-memory cache
    #[validate(nested)]
    pub cache: CacheSettings,

    /// Encrypted local fallback
    #[validate(nested)]
    pub fallback: FallbackSettings,

    /// Background refresh
    #[validate(nested)]
    pub reload: ReloadSettings,

    /// Key rotation
    #[validate(nested)]
    pub rotation: RotationSettings,
}

impl ClientSettings {
    /// Load every section from environment variables
    pub fn from_env() -> Self {
        Self {
            vault: VaultSettings::from_env(),
            retry: RetrySettings::from_env(),
            cache: CacheSettings::from_env(),
            fallback: FallbackSettings::from_env(),
            reload: ReloadSettings::from_env(),
            rotation: RotationSettings::from_env(),
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        if let Some(address) = &self.vault.address {
            if !address.starts_with("http://") && !address.starts_with("https://") {
                return Err(Error::validation(format!(
                    "Vault address must start with http:// or https:// (got '{}')",
                    address
                )));
            }
        }

        if self.vault.secrets_path.trim_matches('/').is_empty() {
            return Err(Error::validation("Vault secrets path cannot be empty"));
        }

        Ok(())
    }
}

/// Remote key-value layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum KvVersion {
    /// Value stored directly at the path
    #[serde(rename = "1")]
    V1,
    /// Value nested under `data`, paths rewritten to `mount/data/...`
    #[default]
    #[serde(rename = "2")]
    V2,
}

impl FromStr for KvVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_start_matches(['v', 'V']) {
            "1" => Ok(KvVersion::V1),
            "2" => Ok(KvVersion::V2),
            other => Err(Error::config(format!("Unsupported KV version: {}", other))),
        }
    }
}

impl fmt::Display for KvVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvVersion::V1 => write!(f, "1"),
            KvVersion::V2 => write!(f, "2"),
        }
    }
}

/// Remote secrets store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VaultSettings {
    /// Server address, e.g. "https://vault.example.com:8200". Unset disables the remote store.
    pub address: Option<String>,

    /// Authentication token
    pub token: Option<SecretString>,

    /// Namespace header value
    pub namespace: Option<String>,

    /// Storage layout
    pub kv_version: KvVersion,

    /// Base path; records live at `{secrets_path}/keys`, `/state`, `/metrics`
    #[validate(length(min = 1, message = "Secrets path cannot be empty"))]
    pub secrets_path: String,

    /// HTTP request timeout in seconds
    #[validate(range(min = 1, max = 300, message = "Request timeout must be between 1 and 300 seconds"))]
    pub request_timeout_seconds: u64,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            address: None,
            token: None,
            namespace: None,
            kv_version: KvVersion::V2,
            secrets_path: "secret/provider-keys".to_string(),
            request_timeout_seconds: 10,
        }
    }
}

impl VaultSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            address: env_string("VAULT_ADDR"),
            token: SecretString::from_env("VAULT_TOKEN"),
            namespace: env_string("VAULT_NAMESPACE"),
            kv_version: env_parse("VAULT_KV_VERSION", defaults.kv_version),
            secrets_path: env_string("VAULT_SECRETS_PATH").unwrap_or(defaults.secrets_path),
            request_timeout_seconds: env_parse(
                "VAULT_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_seconds,
            ),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn is_remote_enabled(&self) -> bool {
        self.address.is_some()
    }
}

/// Retry configuration for remote calls
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetrySettings {
    /// Retries after the first attempt
    #[validate(range(max = 10, message = "Max retries must be at most 10"))]
    pub max_retries: u32,

    /// Backoff base in milliseconds
    #[validate(range(max = 60000, message = "Retry delay must be at most 60000ms"))]
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_retries: 3, base_delay_ms: 500 }
    }
}

impl RetrySettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retries: env_parse("VAULT_MAX_RETRIES", defaults.max_retries),
            base_delay_ms: env_parse("VAULT_RETRY_DELAY_MS", defaults.base_delay_ms),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CacheSettings {
    /// Time-to-live in milliseconds
    #[validate(range(min = 1, message = "Cache TTL must be at least 1ms"))]
    pub ttl_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { ttl_ms: 300_000 } // 5 minutes
    }
}

impl CacheSettings {
    pub fn from_env() -> Self {
        Self { ttl_ms: env_parse("VAULT_CACHE_TTL_MS", Self::default().ttl_ms) }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Encrypted fallback file configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FallbackSettings {
    /// Location of the encrypted JSON file
    pub path: PathBuf,

    /// Secret the file key is derived from. Writes fail without it.
    pub secret: Option<SecretString>,

    /// PBKDF2 iteration count
    #[validate(range(min = 1, message = "KDF iterations must be at least 1"))]
    pub kdf_iterations: u32,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/provider-vault.json"),
            secret: None,
            kdf_iterations: 100_000,
        }
    }
}

impl FallbackSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            path: env_string("VAULT_FALLBACK_FILE").map(PathBuf::from).unwrap_or(defaults.path),
            secret: SecretString::from_env("VAULT_FALLBACK_SECRET"),
            kdf_iterations: env_parse("VAULT_FALLBACK_KDF_ITERATIONS", defaults.kdf_iterations),
        }
    }
}

/// Background refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReloadSettings {
    /// Start the timer when the client is built
    pub enabled: bool,

    /// Refresh interval in milliseconds
    #[validate(range(min = 1000, message = "Reload interval must be at least 1000ms"))]
    pub interval_ms: u64,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self { enabled: false, interval_ms: 300_000 }
    }
}

impl ReloadSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_flag("VAULT_AUTO_RELOAD", defaults.enabled),
            interval_ms: env_parse("VAULT_RELOAD_INTERVAL_MS", defaults.interval_ms),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Enabled reload settings with an explicit interval, range-checked.
    pub fn with_interval_ms(interval_ms: u64) -> Result<Self> {
        let settings = Self { enabled: true, interval_ms };
        Validate::validate(&settings).map_err(Error::from)?;
        Ok(settings)
    }
}

/// Key rotation configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RotationSettings {
    /// Consecutive failures before a key is marked unhealthy
    #[validate(range(min = 1, max = 100, message = "Failure threshold must be between 1 and 100"))]
    pub failure_threshold: u32,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self { failure_threshold: 3 }
    }
}

impl RotationSettings {
    pub fn from_env() -> Self {
        Self {
            failure_threshold: env_parse(
                "VAULT_KEY_FAILURE_THRESHOLD",
                Self::default().failure_threshold,
            ),
        }
    }
}

/// Logging configuration for the binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            level: env_string("PROVIDER_VAULT_LOG_LEVEL").unwrap_or(defaults.level),
            json: env_flag("PROVIDER_VAULT_LOG_JSON", defaults.json),
        }
    }
}
