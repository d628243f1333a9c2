//! Storage seam shared by the remote store, the encrypted file and the
//! environment snapshot.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::error::Result;

/// Logical records kept by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Record {
    /// Credential bundle.
    Keys,
    /// Rotation state.
    State,
    /// Usage metrics.
    Metrics,
}

impl Record {
    pub const ALL: [Record; 3] = [Record::Keys, Record::State, Record::Metrics];

    pub fn as_str(&self) -> &'static str {
        match self {
            Record::Keys => "keys",
            Record::State => "state",
            Record::Metrics => "metrics",
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a value was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Remote,
    Fallback,
    Environment,
    Default,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataSource::Remote => "remote",
            DataSource::Fallback => "fallback",
            DataSource::Environment => "environment",
            DataSource::Default => "default",
        };
        write!(f, "{}", s)
    }
}

/// A backend able to hold the logical records as JSON documents.
///
/// `read` returns `Ok(None)` when the backend is reachable but holds nothing
/// for the record. Errors mean the backend could not be consulted.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Which source this backend represents in the fallback chain.
    fn source(&self) -> DataSource;

    async fn read(&self, record: Record) -> Result<Option<Value>>;

    async fn write(&self, record: Record, value: &Value) -> Result<()>;
}

#[async_trait]
impl<T: SecretStore + ?Sized> SecretStore for Arc<T> {
    fn source(&self) -> DataSource {
        (**self).source()
    }

    async fn read(&self, record: Record) -> Result<Option<Value>> {
        (**self).read(record).await
    }

    async fn write(&self, record: Record, value: &Value) -> Result<()> {
        (**self).write(record, value).await
    }
}
