//! Environment variable credential snapshot.
//!
//! Last resort for the credential bundle when neither the remote store nor
//! the fallback file has anything. Reads the legacy variables:
//!
//! ```bash
//! export GROQ_API_KEY_1="gsk_..."
//! export GROQ_API_KEY_2="gsk_..."
//! export MISTRAL_API_KEY="..."
//! ```
//!
//! Empty values count as unset. Only the `keys` record is served; state and
//! metrics have no environment form. The snapshot is read-only.

use async_trait::async_trait;
use serde_json::Value;

use super::bundle::FlatKeys;
use super::error::{Result, SecretsError};
use super::store::{DataSource, Record, SecretStore};
use super::types::SecretString;

/// Reads the legacy key variables.
#[derive(Debug, Clone)]
pub struct EnvKeys {
    groq_1: String,
    groq_2: String,
    mistral: String,
}

impl Default for EnvKeys {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvKeys {
    pub fn new() -> Self {
        Self::with_names("GROQ_API_KEY_1", "GROQ_API_KEY_2", "MISTRAL_API_KEY")
    }

    /// Read from custom variable names.
    pub fn with_names(
        groq_1: impl Into<String>,
        groq_2: impl Into<String>,
        mistral: impl Into<String>,
    ) -> Self {
        Self { groq_1: groq_1.into(), groq_2: groq_2.into(), mistral: mistral.into() }
    }

    fn var(name: &str) -> Option<String> {
        SecretString::from_env(name).map(|s| s.expose_secret().to_string())
    }

    /// Current values of the variables.
    pub fn snapshot(&self) -> FlatKeys {
        FlatKeys {
            groq_api_key_1: Self::var(&self.groq_1),
            groq_api_key_2: Self::var(&self.groq_2),
            mistral_api_key: Self::var(&self.mistral),
        }
    }
}

#[async_trait]
impl SecretStore for EnvKeys {
    fn source(&self) -> DataSource {
        DataSource::Environment
    }

    async fn read(&self, record: Record) -> Result<Option<Value>> {
        if record != Record::Keys {
            return Ok(None);
        }
        let keys = self.snapshot();
        if keys.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_value(keys)?))
    }

    async fn write(&self, record: Record, _value: &Value) -> Result<()> {
        Err(SecretsError::config_error(format!(
            "Environment credentials are read-only (cannot write '{}')",
            record
        )))
    }
}
