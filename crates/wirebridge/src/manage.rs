// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator commands that work directly against the database: credential
//! and caller key management, watermark signing, log and stats output.

use std::sync::Arc;

use chrono::Utc;
use wirebridge_access::{CredentialPool, KeyRegistry, WatermarkVerifier, mask_secret, new_credential};
use wirebridge_config::WirebridgeConfig;
use wirebridge_core::{
    BackendCredential, CallerKey, GatewayStore, LogStats, RequestLogEntry, StatsPeriod,
    StorageAdapter, WirebridgeError, format_timestamp,
};
use wirebridge_storage::SqliteStorage;

/// Open the configured database, run `op`, close it again.
async fn with_store<T, F, Fut>(config: &WirebridgeConfig, op: F) -> Result<T, WirebridgeError>
where
    F: FnOnce(Arc<dyn GatewayStore>) -> Fut,
    Fut: Future<Output = Result<T, WirebridgeError>>,
{
    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    let result = op(storage.clone()).await;
    storage.close().await?;
    result
}

// --- credentials ---

pub async fn credential_add(
    config: &WirebridgeConfig,
    label: &str,
    token: &str,
    quota: Option<i64>,
) -> Result<(), WirebridgeError> {
    let credential = new_credential(label, token, quota);
    with_store(config, |store| async move {
        store.insert_credential(&credential).await?;
        println!("added credential {}", credential.id);
        println!("{}", credential_row(&credential));
        Ok(())
    })
    .await
}

pub async fn credential_list(config: &WirebridgeConfig) -> Result<(), WirebridgeError> {
    with_store(config, |store| async move {
        let credentials = store.list_credentials().await?;
        if credentials.is_empty() {
            println!("no credentials");
            return Ok(());
        }
        println!(
            "{:<36}  {:<16}  {:<14}  {:>11}  ACTIVE",
            "ID", "LABEL", "TOKEN", "USED/QUOTA"
        );
        for credential in &credentials {
            println!("{}", credential_row(credential));
        }
        Ok(())
    })
    .await
}

pub async fn credential_disable(config: &WirebridgeConfig, id: &str) -> Result<(), WirebridgeError> {
    with_store(config, |store| async move {
        let credential = disable_credential(store.as_ref(), id).await?;
        println!("disabled credential {} ({})", credential.id, credential.label);
        Ok(())
    })
    .await
}

async fn disable_credential(
    store: &dyn GatewayStore,
    id: &str,
) -> Result<BackendCredential, WirebridgeError> {
    let mut credential = store
        .get_credential(id)
        .await?
        .ok_or_else(|| WirebridgeError::NotFound("Credential".into()))?;
    credential.active = false;
    credential.updated_at = format_timestamp(Utc::now());
    store.update_credential(&credential).await?;
    Ok(credential)
}

fn credential_row(c: &BackendCredential) -> String {
    format!(
        "{:<36}  {:<16}  {:<14}  {:>11}  {}",
        c.id,
        c.label,
        mask_secret(&c.token),
        format!("{}/{}", c.used_count, c.daily_quota),
        if c.active { "yes" } else { "no" }
    )
}

// --- caller keys ---

pub async fn key_create(
    config: &WirebridgeConfig,
    name: &str,
    quota: Option<i64>,
    expires_at: Option<&str>,
) -> Result<(), WirebridgeError> {
    let expires_at = expires_at
        .map(wirebridge_gateway::admin::parse_expiry)
        .transpose()
        .map_err(|_| {
            WirebridgeError::InvalidRequest("--expires-at must be RFC 3339 or YYYY-MM-DD".into())
        })?;
    with_store(config, |store| async move {
        let key = KeyRegistry::new(store).issue(name, quota, expires_at).await?;
        println!("created key {} ({})", key.id, key.name);
        println!("secret: {}", key.secret);
        println!("store the secret now; it is not shown again");
        Ok(())
    })
    .await
}

pub async fn key_list(config: &WirebridgeConfig) -> Result<(), WirebridgeError> {
    with_store(config, |store| async move {
        let keys = store.list_keys().await?;
        if keys.is_empty() {
            println!("no caller keys");
            return Ok(());
        }
        println!(
            "{:<36}  {:<16}  {:<14}  {:>13}  {:<6}  EXPIRES",
            "ID", "NAME", "SECRET", "USED/QUOTA", "ACTIVE"
        );
        for key in &keys {
            println!("{}", key_row(key));
        }
        Ok(())
    })
    .await
}

pub async fn key_disable(config: &WirebridgeConfig, id: &str) -> Result<(), WirebridgeError> {
    with_store(config, |store| async move {
        let key = disable_key(store.as_ref(), id).await?;
        println!("disabled key {} ({})", key.id, key.name);
        Ok(())
    })
    .await
}

async fn disable_key(store: &dyn GatewayStore, id: &str) -> Result<CallerKey, WirebridgeError> {
    let mut key = store
        .get_key(id)
        .await?
        .ok_or_else(|| WirebridgeError::NotFound("Caller key".into()))?;
    key.active = false;
    key.updated_at = format_timestamp(Utc::now());
    store.update_key(&key).await?;
    Ok(key)
}

fn key_row(k: &CallerKey) -> String {
    let quota = if k.is_unlimited() {
        "unlimited".to_string()
    } else {
        k.quota.to_string()
    };
    format!(
        "{:<36}  {:<16}  {:<14}  {:>13}  {:<6}  {}",
        k.id,
        k.name,
        mask_secret(&k.secret),
        format!("{}/{}", k.used_count, quota),
        if k.active { "yes" } else { "no" },
        k.expires_at
            .map(format_timestamp)
            .unwrap_or_else(|| "never".into())
    )
}

// --- watermark ---

pub fn watermark_sign(config: &WirebridgeConfig, prompt: &str, salt: Option<&str>) {
    let verifier = match salt {
        Some(salt) => WatermarkVerifier::new(salt, config.watermark.tolerance_buckets),
        None => WatermarkVerifier::from_config(&config.watermark),
    };
    // Zero-width characters survive a plain print; redirect to a file to copy safely.
    println!("{}", verifier.sign_now(prompt));
}

// --- logs and stats ---

pub async fn logs(config: &WirebridgeConfig, limit: usize) -> Result<(), WirebridgeError> {
    with_store(config, |store| async move {
        let entries = store.recent_logs(limit).await?;
        if entries.is_empty() {
            println!("no requests logged");
        }
        for entry in &entries {
            println!("{}", log_line(entry));
        }
        Ok(())
    })
    .await
}

fn log_line(e: &RequestLogEntry) -> String {
    let mut line = format!(
        "{}  {:>3}  {:>6}ms  {} {}  key={}  ip={}",
        e.created_at,
        e.status_code,
        e.latency_ms,
        e.method,
        e.endpoint,
        e.caller_key_id.as_deref().unwrap_or("-"),
        e.client_ip.as_deref().unwrap_or("-"),
    );
    if let Some(err) = &e.error_message {
        line.push_str("  error=");
        line.push_str(err);
    }
    line
}

pub async fn stats(config: &WirebridgeConfig) -> Result<(), WirebridgeError> {
    let offset_minutes = config.pool.reset_utc_offset_minutes;
    let pool_config = config.pool.clone();
    with_store(config, |store| async move {
        let pool = CredentialPool::from_config(store.clone(), &pool_config);
        let now = Utc::now();
        println!("{:<6}  {:>7}  {:>7}  {:>7}  AVG LATENCY", "PERIOD", "TOTAL", "OK", "FAILED");
        for period in [StatsPeriod::Today, StatsPeriod::Week, StatsPeriod::Month] {
            let stats = store.log_stats(pool.period_start(period, now)).await?;
            println!("{}", stats_line(period, &stats));
        }
        println!("(day boundaries at UTC{:+}min)", offset_minutes);
        Ok(())
    })
    .await
}

fn stats_line(period: StatsPeriod, s: &LogStats) -> String {
    format!(
        "{:<6}  {:>7}  {:>7}  {:>7}  {:.1}ms",
        period.to_string(),
        s.total,
        s.succeeded,
        s.failed,
        s.avg_latency_ms
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirebridge_test_utils::MemoryStore;

    fn store() -> Arc<dyn GatewayStore> {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn disabling_a_credential_keeps_the_rest() {
        let store = store();
        let credential = new_credential("main", "tok-abcdefghijkl", None);
        store.insert_credential(&credential).await.unwrap();

        let disabled = disable_credential(store.as_ref(), &credential.id).await.unwrap();
        assert!(!disabled.active);

        let reloaded = store.get_credential(&credential.id).await.unwrap().unwrap();
        assert!(!reloaded.active);
        assert_eq!(reloaded.label, "main");
        assert_eq!(reloaded.token, "tok-abcdefghijkl");
    }

    #[tokio::test]
    async fn disabling_unknown_records_is_not_found() {
        let store = store();
        let err = disable_credential(store.as_ref(), "nope").await.unwrap_err();
        assert_eq!(err.to_string(), "Credential not found");
        let err = disable_key(store.as_ref(), "nope").await.unwrap_err();
        assert_eq!(err.to_string(), "Caller key not found");
    }

    #[tokio::test]
    async fn disabled_keys_stop_validating() {
        let store = store();
        let registry = KeyRegistry::new(store.clone());
        let key = registry.issue("ops", None, None).await.unwrap();
        assert!(registry.validate(&key.secret).await.is_ok());

        disable_key(store.as_ref(), &key.id).await.unwrap();
        assert!(registry.validate(&key.secret).await.is_err());
    }

    #[test]
    fn rows_never_print_full_secrets() {
        let credential = new_credential("main", "tok-abcdefghijkl", Some(20));
        let row = credential_row(&credential);
        assert!(row.contains("tok-****ijkl"));
        assert!(row.contains("0/20"));
        assert!(!row.contains("abcdefghijkl"));

        let key = CallerKey {
            id: "k1".into(),
            name: "ops".into(),
            secret: "ck-0123456789abcdef".into(),
            quota: -1,
            used_count: 3,
            active: false,
            expires_at: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let row = key_row(&key);
        assert!(row.contains("ck-0****cdef"));
        assert!(row.contains("3/unlimited"));
        assert!(row.ends_with("never"));
    }

    #[test]
    fn log_line_includes_error_when_present() {
        let entry = RequestLogEntry {
            id: Some(1),
            caller_key_id: Some("k1".into()),
            credential_id: None,
            endpoint: "/v1/chat/completions".into(),
            method: "POST".into(),
            status_code: 503,
            latency_ms: 12,
            client_ip: None,
            user_agent: None,
            error_message: Some("No available backend credential".into()),
            system_prompt: None,
            user_prompt: None,
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        let line = log_line(&entry);
        assert!(line.contains("503"));
        assert!(line.contains("key=k1"));
        assert!(line.contains("ip=-"));
        assert!(line.ends_with("error=No available backend credential"));
    }

    #[test]
    fn stats_line_formats_average() {
        let stats = LogStats {
            total: 4,
            succeeded: 3,
            failed: 1,
            avg_latency_ms: 12.25,
        };
        let line = stats_line(StatsPeriod::Week, &stats);
        assert!(line.starts_with("week"));
        assert!(line.ends_with("12.2ms") || line.ends_with("12.3ms"));
    }
}
