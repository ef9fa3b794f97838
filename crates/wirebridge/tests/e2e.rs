// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end: on-disk SQLite, a real listener, a scripted backend, and
//! plain HTTP from reqwest.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wirebridge_access::{KeyRegistry, new_credential};
use wirebridge_config::WirebridgeConfig;
use wirebridge_core::{
    CredentialStore, GatewayStore, PluginAdapter, RequestLog, StorageAdapter,
};
use wirebridge_gateway::{GatewayState, Orchestrator, build_router, start_server};
use wirebridge_storage::SqliteStorage;
use wirebridge_test_utils::{BackendScript, MockBackend};

struct Running {
    addr: SocketAddr,
    storage: Arc<SqliteStorage>,
    backend: MockBackend,
    secret: String,
    credential_id: String,
    cancel: CancellationToken,
    server: tokio::task::JoinHandle<()>,
    _dir: tempfile::TempDir,
}

impl Running {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.server.await.unwrap();
        self.storage.close().await.unwrap();
    }
}

async fn start() -> Running {
    let dir = tempfile::tempdir().unwrap();
    let backend = MockBackend::start().await.unwrap();

    let mut config = WirebridgeConfig::default();
    config.storage.database_path = dir
        .path()
        .join("data")
        .join("wirebridge.db")
        .to_string_lossy()
        .into_owned();
    config.backend.ws_url = backend.ws_url();
    config.backend.connect_timeout_secs = 2;
    config.backend.response_timeout_secs = 5;
    config.backend.max_attempts = 1;
    config.server.admin_password = Some("hunter2".into());

    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await.unwrap();
    let store: Arc<dyn GatewayStore> = storage.clone();
    let health: Arc<dyn PluginAdapter> = storage.clone();

    let credential = new_credential("primary", "tok-e2e-abcdefgh", Some(10));
    store.insert_credential(&credential).await.unwrap();
    let key = KeyRegistry::new(store.clone())
        .issue("e2e", None, None)
        .await
        .unwrap();

    let orchestrator = Arc::new(Orchestrator::new(store, &config).unwrap());
    let router = build_router(GatewayState::from_config(orchestrator, &config, Some(health)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    let server = tokio::spawn(async move {
        start_server(listener, router, shutdown).await.unwrap();
    });

    Running {
        addr,
        storage,
        backend,
        secret: key.secret,
        credential_id: credential.id,
        cancel,
        server,
        _dir: dir,
    }
}

#[tokio::test]
async fn health_reports_sqlite() {
    let app = start().await;
    let response = reqwest::get(app.url("/v1/health")).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "ok");
    app.stop().await;
}

#[tokio::test]
async fn chat_completion_round_trip_is_persisted() {
    let app = start().await;
    app.backend.push_script(BackendScript::reply(["Hel", "lo"])).await;

    let client = reqwest::Client::new();
    let response = client
        .post(app.url("/v1/chat/completions"))
        .bearer_auth(&app.secret)
        .json(&json!({
            "model": "vbdo-007",
            "messages": [{ "role": "user", "content": "hello there" }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.headers()["x-ratelimit-limit"], "60");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello");

    assert_eq!(app.backend.tokens().await, ["tok-e2e-abcdefgh"]);

    let credential = app
        .storage
        .get_credential(&app.credential_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(credential.used_count, 1);

    let logs = app.storage.recent_logs(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status_code, 200);
    assert_eq!(logs[0].endpoint, "/v1/chat/completions");
    assert_eq!(logs[0].credential_id.as_deref(), Some(app.credential_id.as_str()));
    assert_eq!(logs[0].client_ip.as_deref(), Some("127.0.0.1"));
    assert_eq!(logs[0].user_prompt.as_deref(), Some("hello there"));

    app.stop().await;
}

#[tokio::test]
async fn chat_stream_over_the_wire() {
    let app = start().await;
    app.backend.push_script(BackendScript::reply(["x", "y"])).await;

    let response = reqwest::Client::new()
        .post(app.url("/chat/completions"))
        .bearer_auth(&app.secret)
        .json(&json!({
            "model": "vbdo-007",
            "stream": true,
            "messages": [{ "role": "user", "content": "stream please" }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let text = response.text().await.unwrap();

    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect();
    assert_eq!(data.last(), Some(&"[DONE]"));
    let deltas: Vec<String> = data[..data.len() - 1]
        .iter()
        .map(|d| serde_json::from_str::<Value>(d).unwrap())
        .filter_map(|v| v["choices"][0]["delta"]["content"].as_str().map(String::from))
        .collect();
    assert_eq!(deltas.concat(), "xy");

    app.stop().await;
}

#[tokio::test]
async fn unknown_key_is_rejected_and_logged() {
    let app = start().await;
    let response = reqwest::Client::new()
        .get(app.url("/v1/models"))
        .bearer_auth("ck-not-a-real-key")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid API key");

    let logs = app.storage.recent_logs(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status_code, 401);
    assert!(logs[0].caller_key_id.is_none());

    app.stop().await;
}

#[tokio::test]
async fn admin_session_lists_masked_credentials() {
    let app = start().await;
    let client = reqwest::Client::new();

    let login = client
        .post(app.url("/admin/login"))
        .json(&json!({ "password": "hunter2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(login.status().as_u16(), 200);
    let cookie = login.headers()["set-cookie"]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let unauthenticated = client
        .get(app.url("/admin/api/credentials"))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthenticated.status().as_u16(), 401);

    let listed: Value = client
        .get(app.url("/admin/api/credentials"))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = listed.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["label"], "primary");
    assert_eq!(items[0]["token"], "tok-****efgh");

    app.stop().await;
}
