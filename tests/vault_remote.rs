//! Integration tests for the Vault KV backend against a mock HTTP server.
//!
//! These cover path layout for both KV versions, auth headers, retry
//! behaviour and the hand-over to the encrypted fallback file.

mod common;

use provider_vault::config::KvVersion;
use provider_vault::secrets::{Provider, Record, SecretStore, SecretsError, VaultKvStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{any, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const V2_KEYS_PATH: &str = "/v1/secret/data/provider-keys/keys";
const V1_KEYS_PATH: &str = "/v1/secret/provider-keys/keys";

fn kv2_body(data: serde_json::Value) -> serde_json::Value {
    json!({
        "data": {
            "data": data,
            "metadata": { "version": 1, "created_time": "2026-01-01T00:00:00Z" }
        }
    })
}

#[tokio::test]
async fn test_structured_payload_fetched_once_and_cached() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(V2_KEYS_PATH))
        .and(header("X-Vault-Token", common::TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(kv2_body(json!({
            "groq": { "accounts": [{ "id": "groq-a", "key": "k1", "dailyLimit": 14400 }] },
            "mistral": { "fallback": { "key": "m1" } }
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client(common::settings(Some(&server.uri()), KvVersion::V2, &dir));

    assert_eq!(client.get_key(Provider::Groq).await.as_deref(), Some("k1"));
    assert_eq!(client.get_key(Provider::Groq).await.as_deref(), Some("k1"));
    assert_eq!(client.get_key(Provider::Mistral).await.as_deref(), Some("m1"));

    let keys = client.get_keys().await;
    assert_eq!(keys.groq_api_key_1.as_deref(), Some("k1"));
    assert_eq!(keys.groq_api_key_2, None);
    assert_eq!(keys.mistral_api_key.as_deref(), Some("m1"));
}

#[tokio::test]
async fn test_kv1_reads_legacy_payload() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(V1_KEYS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "groqApiKey1": "legacy-1", "groqApiKey2": "legacy-2" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client(common::settings(Some(&server.uri()), KvVersion::V1, &dir));
    let bundle = client.get_bundle().await;

    let ids: Vec<_> = bundle.groq.accounts.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, ["groq-1", "groq-2"]);
    assert_eq!(bundle.mistral.fallback, None);
}

#[tokio::test]
async fn test_write_sends_token_namespace_and_kv2_envelope() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path(V2_KEYS_PATH))
        .and(header("X-Vault-Token", common::TOKEN))
        .and(header("X-Vault-Namespace", "team-a"))
        .and(body_partial_json(json!({
            "data": { "groq": { "accounts": [{ "id": "groq-1", "key": "gsk_new" }] } }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = common::settings(Some(&server.uri()), KvVersion::V2, &dir);
    settings.vault.namespace = Some("team-a".to_string());
    let fallback_path = settings.fallback.path.clone();
    let client = common::client(settings);

    client.save_key(Provider::Groq, "gsk_new", None, None).await.unwrap();
    assert!(!fallback_path.exists());
}

#[tokio::test]
async fn test_server_errors_retried_up_to_limit() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(V2_KEYS_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(4)
        .mount(&server)
        .await;

    let settings = common::settings(Some(&server.uri()), KvVersion::V2, &dir);
    assert_eq!(settings.retry.max_retries, 3);
    let client = common::client(settings);

    let err = client.refresh_keys_cache().await.unwrap_err();
    assert!(matches!(err, SecretsError::Http { status: 500, .. }));
}

#[tokio::test]
async fn test_auth_errors_are_not_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(V2_KEYS_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client(common::settings(Some(&server.uri()), KvVersion::V2, &dir));

    let err = client.refresh_keys_cache().await.unwrap_err();
    assert!(matches!(err, SecretsError::AuthenticationFailed { .. }));
}

#[tokio::test]
async fn test_undecodable_body_is_not_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(V2_KEYS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client(common::settings(Some(&server.uri()), KvVersion::V2, &dir));

    let err = client.refresh_keys_cache().await.unwrap_err();
    assert!(matches!(err, SecretsError::InvalidValue { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_transient_failure_recovers_on_retry() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(V2_KEYS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(V2_KEYS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(kv2_body(json!({ "groqApiKey1": "late" }))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client(common::settings(Some(&server.uri()), KvVersion::V2, &dir));
    let keys = client.refresh_keys_cache().await.unwrap();
    assert_eq!(keys.groq_api_key_1.as_deref(), Some("late"));
}

#[tokio::test]
async fn test_failed_remote_write_lands_in_fallback_file() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let settings = common::settings(Some(&server.uri()), KvVersion::V2, &dir);
    let fallback_path = settings.fallback.path.clone();
    let client = common::client(settings);

    client.save_key(Provider::Groq, "gsk_local", Some("groq-local"), Some(100)).await.unwrap();
    assert!(fallback_path.exists());

    client.invalidate_cache().await;
    assert_eq!(client.get_key(Provider::Groq).await.as_deref(), Some("gsk_local"));
}

#[tokio::test]
async fn test_missing_token_sends_nothing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut settings = common::settings(Some(&server.uri()), KvVersion::V2, &dir);
    settings.vault.token = None;
    let store = VaultKvStore::new(&settings.vault).unwrap();

    let err = store.read(Record::Keys).await.unwrap_err();
    assert!(matches!(err, SecretsError::ConfigError { .. }));
    let err = store.write(Record::State, &json!({})).await.unwrap_err();
    assert!(matches!(err, SecretsError::ConfigError { .. }));
}

#[tokio::test]
async fn test_state_and_metrics_use_sibling_paths() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/secret/data/provider-keys/state"))
        .and(body_partial_json(json!({ "data": { "activeKey": "groq-2" } })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/secret/data/provider-keys/metrics"))
        .and(body_partial_json(json!({ "data": { "totalRequests": 1 } })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client(common::settings(Some(&server.uri()), KvVersion::V2, &dir));

    let state = client
        .update_rotation_state(provider_vault::secrets::RotationStatePatch {
            active_key: Some("groq-2".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(state.active_key.as_deref(), Some("groq-2"));

    let delta = provider_vault::secrets::UsageMetrics { total_requests: 1, ..Default::default() };
    assert_eq!(client.update_metrics(delta).await.unwrap().total_requests, 1);
}

#[tokio::test]
async fn test_kv2_metadata() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/v1/secret/metadata/provider-keys/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "current_version": 3,
                "created_time": "2026-01-01T00:00:00Z",
                "updated_time": "2026-02-01T00:00:00Z",
                "versions": {}
            }
        })))
        .mount(&server)
        .await;

    let settings = common::settings(Some(&server.uri()), KvVersion::V2, &dir);
    let store = VaultKvStore::new(&settings.vault).unwrap();

    let meta = store.metadata(&store.record_path(Record::Keys)).await.unwrap().unwrap();
    assert_eq!(meta.current_version, 3);
    assert!(meta.updated_time > meta.created_time);

    assert_eq!(store.metadata(&store.record_path(Record::State)).await.unwrap(), None);

    let v1 = common::settings(Some(&server.uri()), KvVersion::V1, &dir);
    let v1_store = VaultKvStore::new(&v1.vault).unwrap();
    assert_eq!(v1_store.metadata(&v1_store.record_path(Record::Keys)).await.unwrap(), None);
}

#[tokio::test]
async fn test_auto_reload_picks_up_remote_changes() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(V2_KEYS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(kv2_body(json!({ "groqApiKey1": "old" }))))
        .mount(&server)
        .await;

    let client = Arc::new(common::client(common::settings(
        Some(&server.uri()),
        KvVersion::V2,
        &dir,
    )));
    assert_eq!(client.get_keys().await.groq_api_key_1.as_deref(), Some("old"));

    server.reset().await;
    Mock::given(method("GET"))
        .and(path(V2_KEYS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(kv2_body(json!({ "groqApiKey1": "new" }))))
        .mount(&server)
        .await;

    // Still served from cache until a refresh runs.
    assert_eq!(client.get_keys().await.groq_api_key_1.as_deref(), Some("old"));

    client.start_auto_reload(Duration::from_millis(50));
    tokio::time::sleep(Duration::from_millis(400)).await;
    client.stop_auto_reload();

    assert_eq!(client.get_keys().await.groq_api_key_1.as_deref(), Some("new"));
}
