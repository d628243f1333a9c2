//! # Structured Logging
//!
//! Subscriber setup and span macros built on the tracing ecosystem.
//!
//! The level comes from `RUST_LOG` when set, otherwise from the configured
//! default. JSON lines are emitted when `PROVIDER_VAULT_LOG_JSON=true`.

use crate::config::LoggingConfig;
use crate::errors::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Create a tracing span for a secrets record operation.
///
/// ```rust,ignore
/// let span = secrets_span!("update_metrics", Record::Metrics);
/// ```
#[macro_export]
macro_rules! secrets_span {
    ($operation:expr, $record:expr) => {
        tracing::debug_span!(
            "secrets_operation",
            operation = %$operation,
            record = %$record,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $record:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "secrets_operation",
            operation = %$operation,
            record = %$record,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

fn env_filter(config: &LoggingConfig, verbose: bool) -> Result<EnvFilter> {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::try_from_default_env()
            .map_err(|e| Error::config_with_source("Invalid RUST_LOG filter", Box::new(e)));
    }
    let level = if verbose { "debug" } else { config.level.as_str() };
    EnvFilter::try_new(level)
        .map_err(|e| Error::config_with_source(format!("Invalid log level '{}'", level), Box::new(e)))
}

/// Install the global subscriber.
///
/// Returns `Ok(false)` when a subscriber was already installed elsewhere
/// (integration tests, embedding applications).
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<bool> {
    let filter = env_filter(config, verbose)?;

    let installed = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init().is_ok()
    };

    Ok(installed)
}

/// Log the effective configuration. Credentials print as `[REDACTED]`.
pub fn log_config_info(config: &crate::config::AppConfig) {
    let client = &config.client;
    tracing::info!(
        vault_address = client.vault.address.as_deref().unwrap_or("-"),
        kv_version = %client.vault.kv_version,
        secrets_path = %client.vault.secrets_path,
        namespace = client.vault.namespace.as_deref().unwrap_or("-"),
        token_configured = client.vault.token.is_some(),
        fallback_file = %client.fallback.path.display(),
        fallback_secret_configured = client.fallback.secret.is_some(),
        cache_ttl_ms = client.cache.ttl_ms,
        max_retries = client.retry.max_retries,
        auto_reload = client.reload.enabled,
        "Provider vault configuration loaded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_invalid_level_is_rejected() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig { level: "provider_vault=loud".to_string(), json: false };
        assert!(env_filter(&config, false).is_err());
        assert!(env_filter(&LoggingConfig::default(), true).is_ok());
    }

    #[traced_test]
    #[test]
    fn test_config_info_hides_credentials() {
        let mut config = crate::config::AppConfig::default();
        config.client.vault.token = Some(crate::secrets::SecretString::new("hvs.very-secret"));
        log_config_info(&config);

        assert!(logs_contain("token_configured=true"));
        assert!(!logs_contain("hvs.very-secret"));
    }

    #[traced_test]
    #[test]
    fn test_secrets_span_macro() {
        let span = secrets_span!("load", crate::secrets::Record::State);
        let _entered = span.enter();
        tracing::debug!("inside span");
        assert!(logs_contain("inside span"));
    }
}
