//! # Configuration Management
//!
//! Settings for the provider vault, loaded from environment variables with
//! defaults and validated with `validator`.

pub mod settings;

pub use settings::{
    CacheSettings, ClientSettings, FallbackSettings, KvVersion, LoggingConfig, ReloadSettings,
    RetrySettings, RotationSettings, VaultSettings,
};

use crate::errors::Result;
use serde::Serialize;

/// Everything the binary needs to start
#[derive(Debug, Clone, Default, Serialize)]
pub struct AppConfig {
    pub client: ClientSettings,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self { client: ClientSettings::from_env(), logging: LoggingConfig::from_env() };
        config.client.validate()?;
        Ok(config)
    }
}
