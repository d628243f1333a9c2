//! Provider credential bundle and the legacy flat key shape.
//!
//! Two payload shapes exist in the remote store:
//!
//! ```text
//! structured: {"groq":{"accounts":[{"id":"groq-1","key":"...","dailyLimit":14400}]},
//!              "mistral":{"fallback":{"key":"..."}}}
//! legacy:     {"groqApiKey1":"...","groqApiKey2":"...","mistralApiKey":"..."}
//! ```
//!
//! [`SecretPayload`] accepts either at the boundary and
//! [`SecretPayload::normalize`] is the only place that converts between them.
//! Everything past that point works on [`SecretBundle`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::error::SecretsError;

/// Credential providers managed by the vault client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Rotation-eligible accounts.
    Groq,
    /// Single fallback credential.
    Mistral,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::Mistral => "mistral",
        }
    }
}

impl FromStr for Provider {
    type Err = SecretsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "mistral" => Ok(Self::Mistral),
            other => Err(SecretsError::invalid_value(format!("Unknown provider: {}", other))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One rotation-eligible Groq account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroqAccount {
    #[serde(default)]
    pub id: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroqSection {
    #[serde(default)]
    pub accounts: Vec<GroqAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackCredential {
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MistralSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackCredential>,
}

/// Structured credential bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretBundle {
    #[serde(default)]
    pub groq: GroqSection,
    #[serde(default)]
    pub mistral: MistralSection,
}

/// Legacy flat key view.
///
/// Also the shape returned by `VaultClient::get_keys`. Converting a bundle
/// into this view drops account ids and daily limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatKeys {
    #[serde(rename = "groqApiKey1", default, skip_serializing_if = "Option::is_none")]
    pub groq_api_key_1: Option<String>,
    #[serde(rename = "groqApiKey2", default, skip_serializing_if = "Option::is_none")]
    pub groq_api_key_2: Option<String>,
    #[serde(rename = "mistralApiKey", default, skip_serializing_if = "Option::is_none")]
    pub mistral_api_key: Option<String>,
}

const LEGACY_FIELDS: [&str; 3] = ["groqApiKey1", "groqApiKey2", "mistralApiKey"];

impl FlatKeys {
    pub fn is_empty(&self) -> bool {
        self.groq_api_key_1.is_none()
            && self.groq_api_key_2.is_none()
            && self.mistral_api_key.is_none()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl SecretBundle {
    pub fn is_empty(&self) -> bool {
        self.groq.accounts.is_empty() && self.mistral.fallback.is_none()
    }

    pub fn account(&self, id: &str) -> Option<&GroqAccount> {
        self.groq.accounts.iter().find(|a| a.id == id)
    }

    /// Key for a provider without regard to rotation state.
    pub fn first_key(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Groq => self.groq.accounts.first().map(|a| a.key.as_str()),
            Provider::Mistral => self.mistral.fallback.as_ref().map(|f| f.key.as_str()),
        }
    }

    /// Lowest `groq-{n}` id not used by any account.
    fn next_account_id(&self) -> String {
        (1..)
            .map(|n| format!("groq-{}", n))
            .find(|candidate| self.account(candidate).is_none())
            .unwrap_or_default()
    }

    /// Insert or update a Groq account and return its id.
    ///
    /// With an id, the matching account is replaced (keeping its daily limit
    /// when none is given) or a new one is appended. Without an id, an account
    /// holding the same key is updated, otherwise the key is appended under
    /// the next free `groq-{n}` id.
    pub fn upsert_account(
        &mut self,
        id: Option<&str>,
        key: &str,
        daily_limit: Option<u64>,
    ) -> String {
        let existing = match id {
            Some(id) => self.groq.accounts.iter_mut().find(|a| a.id == id),
            None => self.groq.accounts.iter_mut().find(|a| a.key == key),
        };

        if let Some(account) = existing {
            account.key = key.to_string();
            if daily_limit.is_some() {
                account.daily_limit = daily_limit;
            }
            return account.id.clone();
        }

        let id = id.map(str::to_string).unwrap_or_else(|| self.next_account_id());
        self.groq.accounts.push(GroqAccount { id: id.clone(), key: key.to_string(), daily_limit });
        id
    }

    pub fn set_fallback(&mut self, key: &str) {
        self.mistral.fallback = Some(FallbackCredential { key: key.to_string() });
    }

    /// Merge one credential into the bundle. Returns the affected account id
    /// for Groq, `None` for the Mistral fallback.
    pub fn apply(
        &mut self,
        provider: Provider,
        key: &str,
        id: Option<&str>,
        daily_limit: Option<u64>,
    ) -> Option<String> {
        match provider {
            Provider::Groq => Some(self.upsert_account(id, key, daily_limit)),
            Provider::Mistral => {
                self.set_fallback(key);
                None
            }
        }
    }

    pub fn flatten(&self) -> FlatKeys {
        let mut accounts = self.groq.accounts.iter().map(|a| a.key.clone());
        FlatKeys {
            groq_api_key_1: accounts.next(),
            groq_api_key_2: accounts.next(),
            mistral_api_key: self.mistral.fallback.as_ref().map(|f| f.key.clone()),
        }
    }

    /// Fill in missing account ids and drop accounts with empty keys.
    fn normalized(mut self) -> Self {
        self.groq.accounts.retain(|a| !a.key.trim().is_empty());
        for index in 0..self.groq.accounts.len() {
            if self.groq.accounts[index].id.is_empty() {
                let id = self.next_account_id();
                self.groq.accounts[index].id = id;
            }
        }
        if self.mistral.fallback.as_ref().is_some_and(|f| f.key.trim().is_empty()) {
            self.mistral.fallback = None;
        }
        self
    }
}

impl From<&FlatKeys> for SecretBundle {
    fn from(legacy: &FlatKeys) -> Self {
        let mut bundle = SecretBundle::default();
        for (index, key) in [&legacy.groq_api_key_1, &legacy.groq_api_key_2].into_iter().enumerate()
        {
            if let Some(key) = non_empty(key) {
                bundle.groq.accounts.push(GroqAccount {
                    id: format!("groq-{}", index + 1),
                    key: key.to_string(),
                    daily_limit: None,
                });
            }
        }
        if let Some(key) = non_empty(&legacy.mistral_api_key) {
            bundle.set_fallback(key);
        }
        bundle
    }
}

/// A credential payload as found at the storage boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretPayload {
    Structured(SecretBundle),
    Legacy(FlatKeys),
}

impl SecretPayload {
    /// Classify a raw JSON document.
    ///
    /// An object carrying `groq` or `mistral` is structured; otherwise any of
    /// the legacy field names makes it legacy. Anything else is an empty
    /// structured bundle.
    pub fn from_value(value: Value) -> Result<Self, SecretsError> {
        let is_structured = value.get("groq").is_some() || value.get("mistral").is_some();
        let is_legacy = LEGACY_FIELDS.iter().any(|field| value.get(field).is_some());

        if !is_structured && is_legacy {
            Ok(Self::Legacy(serde_json::from_value(value)?))
        } else if value.is_object() {
            Ok(Self::Structured(serde_json::from_value(value)?))
        } else if value.is_null() {
            Ok(Self::Structured(SecretBundle::default()))
        } else {
            Err(SecretsError::invalid_value("Secret payload must be a JSON object"))
        }
    }

    /// Convert to the structured bundle.
    pub fn normalize(self) -> SecretBundle {
        match self {
            Self::Structured(bundle) => bundle.normalized(),
            Self::Legacy(flat) => SecretBundle::from(&flat),
        }
    }
}

impl Serialize for SecretPayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Structured(bundle) => bundle.serialize(serializer),
            Self::Legacy(flat) => flat.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for SecretPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        SecretPayload::from_value(value).map_err(serde::de::Error::custom)
    }
}
