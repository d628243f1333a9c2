//! # Provider Vault
//!
//! Credential storage for an AI provider router: Groq API keys with rotation
//! and daily quotas, a Mistral fallback key, rotation state and usage
//! metrics.
//!
//! ## Architecture
//!
//! ```text
//! VaultClient ─ TtlCache ─ RetryingStore<VaultKvStore>   (HashiCorp Vault KV v1/v2)
//!                        └ EncryptedFileStore            (AES-256-GCM local file)
//!                        └ EnvKeys                       (GROQ_API_KEY_*, MISTRAL_API_KEY)
//! ```
//!
//! Reads degrade through the chain and never fail because a backend is
//! unavailable. Writes go to Vault and fall back to the encrypted file.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use provider_vault::config::ClientSettings;
//! use provider_vault::secrets::{Provider, VaultClient};
//!
//! #[tokio::main]
//! async fn main() -> provider_vault::Result<()> {
//!     let client = VaultClient::shared(ClientSettings::from_env())?;
//!     if let Some(key) = client.get_key(Provider::Groq).await {
//!         println!("using key of length {}", key.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod observability;
pub mod secrets;

// Re-export commonly used types
pub use config::{AppConfig, ClientSettings};
pub use errors::{Error, Result};
pub use secrets::{Provider, SecretsError, VaultClient};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
