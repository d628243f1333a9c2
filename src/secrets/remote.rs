//! HashiCorp Vault KV store backend.
//!
//! Talks to the KV secrets engine over plain HTTP so both storage layouts can
//! be addressed from the same client:
//!
//! - **KV v1**: `GET/POST {addr}/v1/{mount}/{path}`, the value is the body `data`
//! - **KV v2**: `GET/POST {addr}/v1/{mount}/data/{path}`, the value is nested
//!   under `data.data` and writes are wrapped as `{"data": value}`
//!
//! Every request carries `X-Vault-Token`, plus `X-Vault-Namespace` when a
//! namespace is configured.
//!
//! # Example
//!
//! ```rust,ignore
//! use provider_vault::config::VaultSettings;
//! use provider_vault::secrets::{Record, SecretStore, VaultKvStore};
//!
//! let store = VaultKvStore::new(&VaultSettings::from_env())?;
//! let keys = store.read(Record::Keys).await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::error::{Result, SecretsError};
use super::store::{DataSource, Record, SecretStore};
use super::types::SecretString;
use crate::config::{KvVersion, VaultSettings};

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// Version metadata for a KV v2 secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMetadata {
    pub current_version: u64,
    pub created_time: Option<DateTime<Utc>>,
    pub updated_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct MetadataBody {
    #[serde(default)]
    current_version: u64,
    #[serde(default)]
    created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_time: Option<DateTime<Utc>>,
}

/// Remote store backed by a Vault KV mount.
#[derive(Debug, Clone)]
pub struct VaultKvStore {
    http: Client,
    address: String,
    token: Option<SecretString>,
    namespace: Option<String>,
    kv_version: KvVersion,
    secrets_path: String,
}

impl VaultKvStore {
    /// Build a store from settings. Fails when no address is configured.
    ///
    /// A missing token is not an error here; requests fail with a
    /// configuration error instead, before anything is sent.
    pub fn new(settings: &VaultSettings) -> Result<Self> {
        let address = settings
            .address
            .as_deref()
            .map(|a| a.trim_end_matches('/').to_string())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| SecretsError::config_error("Vault address is not configured"))?;

        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| SecretsError::config_error(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            address,
            token: settings.token.clone().filter(|t| !t.is_empty()),
            namespace: settings.namespace.clone().filter(|n| !n.is_empty()),
            kv_version: settings.kv_version,
            secrets_path: settings.secrets_path.trim_matches('/').to_string(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn kv_version(&self) -> KvVersion {
        self.kv_version
    }

    /// Logical path of a record, before any KV v2 rewrite.
    pub fn record_path(&self, record: Record) -> String {
        format!("{}/{}", self.secrets_path, record)
    }

    /// API path for reading and writing data at `path`.
    pub fn data_path(&self, path: &str) -> String {
        match self.kv_version {
            KvVersion::V1 => path.to_string(),
            KvVersion::V2 => insert_segment(path, "data"),
        }
    }

    fn url(&self, api_path: &str) -> String {
        format!("{}/v1/{}", self.address, api_path)
    }

    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| SecretsError::config_error("Vault token is not configured"))?;

        let request = request.header(TOKEN_HEADER, token.expose_secret());
        Ok(match &self.namespace {
            Some(namespace) => request.header(NAMESPACE_HEADER, namespace),
            None => request,
        })
    }

    /// Read the raw value stored at `path`. `Ok(None)` when nothing is there.
    #[instrument(skip(self), fields(kv_version = %self.kv_version))]
    pub async fn read_path(&self, path: &str) -> Result<Option<Value>> {
        let request = self.authorize(self.http.get(self.url(&self.data_path(path))))?;
        let response = request.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(path, "Secret not found in Vault");
            return Ok(None);
        }
        let body: Value = check_status(response, path).await?.json().await?;

        let value = match self.kv_version {
            KvVersion::V1 => body.get("data"),
            KvVersion::V2 => body.get("data").and_then(|d| d.get("data")),
        };
        Ok(value.filter(|v| !v.is_null()).cloned())
    }

    /// Write `value` at `path`, replacing what was there.
    #[instrument(skip(self, value), fields(kv_version = %self.kv_version))]
    pub async fn write_path(&self, path: &str, value: &Value) -> Result<()> {
        let body = match self.kv_version {
            KvVersion::V1 => value.clone(),
            KvVersion::V2 => json!({ "data": value }),
        };
        let request = self.authorize(self.http.post(self.url(&self.data_path(path))))?;
        check_status(request.json(&body).send().await?, path).await?;
        debug!(path, "Stored secret in Vault");
        Ok(())
    }

    /// Version metadata for `path`. KV v1 keeps no versions and returns `None`.
    #[instrument(skip(self))]
    pub async fn metadata(&self, path: &str) -> Result<Option<RemoteMetadata>> {
        if self.kv_version == KvVersion::V1 {
            return Ok(None);
        }

        let api_path = insert_segment(path, "metadata");
        let response = self.authorize(self.http.get(self.url(&api_path)))?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = check_status(response, path).await?.json().await?;

        let Some(data) = body.get("data").cloned() else {
            return Ok(None);
        };
        let meta: MetadataBody = serde_json::from_value(data)?;
        Ok(Some(RemoteMetadata {
            current_version: meta.current_version,
            created_time: meta.created_time,
            updated_time: meta.updated_time,
        }))
    }
}

/// `mount/rest` becomes `mount/{segment}/rest`.
fn insert_segment(path: &str, segment: &str) -> String {
    let path = path.trim_matches('/');
    match path.split_once('/') {
        Some((mount, rest)) => format!("{}/{}/{}", mount, segment, rest),
        None => format!("{}/{}", path, segment),
    }
}

async fn check_status(response: Response, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    let message = if message.trim().is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        message
    };

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SecretsError::authentication_failed(format!("{} ({})", message.trim(), status.as_u16()))
        }
        StatusCode::NOT_FOUND => SecretsError::not_found(path),
        _ => SecretsError::http(status.as_u16(), message.trim()),
    })
}

#[async_trait]
impl SecretStore for VaultKvStore {
    fn source(&self) -> DataSource {
        DataSource::Remote
    }

    async fn read(&self, record: Record) -> Result<Option<Value>> {
        self.read_path(&self.record_path(record)).await
    }

    async fn write(&self, record: Record, value: &Value) -> Result<()> {
        self.write_path(&self.record_path(record), value).await
    }
}
