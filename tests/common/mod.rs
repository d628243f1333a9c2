//! Shared helpers for integration tests.
#![allow(dead_code)]

use provider_vault::config::{ClientSettings, FallbackSettings, KvVersion};
use provider_vault::secrets::{
    EncryptedFileStore, EnvKeys, SecretStore, SecretString, VaultClient, VaultKvStore,
};
use std::sync::Arc;
use tempfile::TempDir;

pub const TOKEN: &str = "test-root-token";
pub const FALLBACK_SECRET: &str = "fallback-file-secret";

/// Settings pointing at `address` with a fallback file inside `dir`.
///
/// Retries use a 1ms base delay so retry tests stay fast.
pub fn settings(address: Option<&str>, kv_version: KvVersion, dir: &TempDir) -> ClientSettings {
    let mut settings = ClientSettings::default();
    settings.vault.address = address.map(str::to_string);
    settings.vault.token = Some(SecretString::new(TOKEN));
    settings.vault.kv_version = kv_version;
    settings.vault.request_timeout_seconds = 2;
    settings.retry.base_delay_ms = 1;
    settings.fallback = FallbackSettings {
        path: dir.path().join("fallback.json"),
        secret: Some(SecretString::new(FALLBACK_SECRET)),
        kdf_iterations: 16,
    };
    settings
}

/// Client whose environment layer reads variables that are never set.
pub fn client(settings: ClientSettings) -> VaultClient {
    let remote = settings
        .vault
        .is_remote_enabled()
        .then(|| VaultKvStore::new(&settings.vault))
        .transpose()
        .expect("valid vault settings")
        .map(|store| Arc::new(store) as Arc<dyn SecretStore>);
    let fallback = Arc::new(EncryptedFileStore::new(&settings.fallback));
    let env = EnvKeys::with_names(
        "PROVIDER_VAULT_TEST_UNSET_GROQ_1",
        "PROVIDER_VAULT_TEST_UNSET_GROQ_2",
        "PROVIDER_VAULT_TEST_UNSET_MISTRAL",
    );
    VaultClient::with_stores(settings, remote, fallback, env)
}
