//! Provider credential storage with layered fallback.
//!
//! Three logical records are kept for the AI provider router:
//!
//! - **keys**: the credential bundle (Groq accounts plus a Mistral fallback key)
//! - **state**: rotation state (active key, per-key health)
//! - **metrics**: usage counters per key
//!
//! # Architecture
//!
//! Every backend implements [`SecretStore`]:
//!
//! - [`VaultKvStore`]: HashiCorp Vault KV v1 or v2 over HTTP
//! - [`EncryptedFileStore`]: local AES-256-GCM file used when Vault is down
//! - [`EnvKeys`]: read-only snapshot of `GROQ_API_KEY_*` / `MISTRAL_API_KEY`
//!
//! [`VaultClient`] composes them with a [`TtlCache`] in front and a
//! [`RetryPolicy`] around the remote store:
//!
//! ```text
//! cache -> Vault (retry) -> encrypted file -> environment -> default
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use provider_vault::config::ClientSettings;
//! use provider_vault::secrets::{Provider, VaultClient};
//!
//! let client = VaultClient::shared(ClientSettings::from_env())?;
//! client.save_key(Provider::Groq, "gsk_...", None, Some(14_400)).await?;
//!
//! if let Some(key) = client.get_key(Provider::Groq).await {
//!     // call the provider, then report the outcome
//!     client.record_usage("groq-1", true, None).await?;
//! }
//! ```

pub mod bundle;
pub mod cache;
pub mod client;
pub mod crypto;
pub mod env;
pub mod error;
pub mod fallback;
pub mod reload;
pub mod remote;
pub mod retry;
pub mod rotation;
pub mod state;
pub mod store;
pub mod types;
pub mod usage;

pub use bundle::{
    FallbackCredential, FlatKeys, GroqAccount, GroqSection, MistralSection, Provider,
    SecretBundle, SecretPayload,
};
pub use cache::{CacheKey, CachedValue, TtlCache};
pub use client::VaultClient;
pub use env::EnvKeys;
pub use error::{Result, SecretsError};
pub use fallback::{EncryptedFileStore, FallbackRead};
pub use reload::AutoReload;
pub use remote::{RemoteMetadata, VaultKvStore};
pub use retry::{RetryPolicy, RetryingStore};
pub use rotation::{KeyQuota, KeyRotator};
pub use state::{HealthLevel, HealthStatus, RotationState, RotationStatePatch};
pub use store::{DataSource, Record, SecretStore};
pub use types::SecretString;
pub use usage::{KeyUsage, UsageMetrics};
