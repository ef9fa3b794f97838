// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory implementation of every store trait.
//!
//! Mirrors the SQLite semantics the gateway relies on (atomic increments,
//! once-per-date reset, unique caller secrets) without touching disk.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use wirebridge_core::{
    AdminSessionStore, BackendCredential, CallerKey, CallerKeyStore, CredentialStore, LogStats,
    RateKind, RateLimitStore, RequestLog, RequestLogEntry, WirebridgeError, format_timestamp,
};

#[derive(Default)]
struct Inner {
    credentials: Vec<BackendCredential>,
    keys: Vec<CallerKey>,
    windows: HashMap<(String, RateKind, i64), i64>,
    logs: Vec<RequestLogEntry>,
    sessions: HashMap<String, DateTime<Utc>>,
}

/// A process-local store for tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the request log, oldest first.
    pub async fn logs(&self) -> Vec<RequestLogEntry> {
        self.inner.lock().await.logs.clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn list_credentials(&self) -> Result<Vec<BackendCredential>, WirebridgeError> {
        Ok(self.inner.lock().await.credentials.clone())
    }

    async fn get_credential(
        &self,
        id: &str,
    ) -> Result<Option<BackendCredential>, WirebridgeError> {
        let inner = self.inner.lock().await;
        Ok(inner.credentials.iter().find(|c| c.id == id).cloned())
    }

    async fn insert_credential(
        &self,
        credential: &BackendCredential,
    ) -> Result<(), WirebridgeError> {
        let mut inner = self.inner.lock().await;
        if inner.credentials.iter().any(|c| c.id == credential.id) {
            return Err(WirebridgeError::Conflict("credential already exists".into()));
        }
        inner.credentials.push(credential.clone());
        Ok(())
    }

    async fn update_credential(
        &self,
        credential: &BackendCredential,
    ) -> Result<bool, WirebridgeError> {
        let mut inner = self.inner.lock().await;
        match inner.credentials.iter_mut().find(|c| c.id == credential.id) {
            Some(existing) => {
                existing.label = credential.label.clone();
                existing.token = credential.token.clone();
                existing.daily_quota = credential.daily_quota;
                existing.used_count = credential.used_count;
                existing.active = credential.active;
                existing.updated_at = format_timestamp(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_credential(&self, id: &str) -> Result<bool, WirebridgeError> {
        let mut inner = self.inner.lock().await;
        let before = inner.credentials.len();
        inner.credentials.retain(|c| c.id != id);
        Ok(inner.credentials.len() != before)
    }

    async fn increment_credential_usage(&self, id: &str) -> Result<(), WirebridgeError> {
        let mut inner = self.inner.lock().await;
        if let Some(c) = inner.credentials.iter_mut().find(|c| c.id == id) {
            c.used_count += 1;
        }
        Ok(())
    }

    async fn reset_daily_usage(&self, today: NaiveDate) -> Result<u64, WirebridgeError> {
        let mut inner = self.inner.lock().await;
        let mut reset = 0;
        for c in inner
            .credentials
            .iter_mut()
            .filter(|c| c.last_reset_date != Some(today))
        {
            c.used_count = 0;
            c.last_reset_date = Some(today);
            reset += 1;
        }
        Ok(reset)
    }
}

#[async_trait]
impl CallerKeyStore for MemoryStore {
    async fn get_key_by_secret(&self, secret: &str) -> Result<Option<CallerKey>, WirebridgeError> {
        let inner = self.inner.lock().await;
        Ok(inner.keys.iter().find(|k| k.secret == secret).cloned())
    }

    async fn get_key(&self, id: &str) -> Result<Option<CallerKey>, WirebridgeError> {
        let inner = self.inner.lock().await;
        Ok(inner.keys.iter().find(|k| k.id == id).cloned())
    }

    async fn list_keys(&self) -> Result<Vec<CallerKey>, WirebridgeError> {
        Ok(self.inner.lock().await.keys.clone())
    }

    async fn insert_key(&self, key: &CallerKey) -> Result<(), WirebridgeError> {
        let mut inner = self.inner.lock().await;
        if inner
            .keys
            .iter()
            .any(|k| k.secret == key.secret || k.id == key.id)
        {
            return Err(WirebridgeError::Conflict("caller key already exists".into()));
        }
        inner.keys.push(key.clone());
        Ok(())
    }

    async fn update_key(&self, key: &CallerKey) -> Result<bool, WirebridgeError> {
        let mut inner = self.inner.lock().await;
        match inner.keys.iter_mut().find(|k| k.id == key.id) {
            Some(existing) => {
                existing.name = key.name.clone();
                existing.quota = key.quota;
                existing.used_count = key.used_count;
                existing.active = key.active;
                existing.expires_at = key.expires_at;
                existing.updated_at = format_timestamp(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_key(&self, id: &str) -> Result<bool, WirebridgeError> {
        let mut inner = self.inner.lock().await;
        let before = inner.keys.len();
        inner.keys.retain(|k| k.id != id);
        Ok(inner.keys.len() != before)
    }

    async fn increment_key_usage(&self, id: &str) -> Result<(), WirebridgeError> {
        let mut inner = self.inner.lock().await;
        if let Some(k) = inner.keys.iter_mut().find(|k| k.id == id) {
            k.used_count += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn window_count(
        &self,
        identity: &str,
        kind: RateKind,
        window_start: i64,
    ) -> Result<i64, WirebridgeError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .windows
            .get(&(identity.to_string(), kind, window_start))
            .copied()
            .unwrap_or(0))
    }

    async fn increment_window(
        &self,
        identity: &str,
        kind: RateKind,
        window_start: i64,
    ) -> Result<i64, WirebridgeError> {
        let mut inner = self.inner.lock().await;
        let count = inner
            .windows
            .entry((identity.to_string(), kind, window_start))
            .or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn purge_windows_before(&self, cutoff: i64) -> Result<u64, WirebridgeError> {
        let mut inner = self.inner.lock().await;
        let before = inner.windows.len();
        inner.windows.retain(|(_, _, start), _| *start >= cutoff);
        Ok((before - inner.windows.len()) as u64)
    }
}

#[async_trait]
impl RequestLog for MemoryStore {
    async fn append_log(&self, entry: &RequestLogEntry) -> Result<(), WirebridgeError> {
        let mut inner = self.inner.lock().await;
        let mut entry = entry.clone();
        entry.id = Some(inner.logs.len() as i64 + 1);
        inner.logs.push(entry);
        Ok(())
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<RequestLogEntry>, WirebridgeError> {
        let inner = self.inner.lock().await;
        Ok(inner.logs.iter().rev().take(limit).cloned().collect())
    }

    async fn log_stats(&self, since: DateTime<Utc>) -> Result<LogStats, WirebridgeError> {
        let since = format_timestamp(since);
        let inner = self.inner.lock().await;
        let window: Vec<&RequestLogEntry> =
            inner.logs.iter().filter(|e| e.created_at >= since).collect();
        let total = window.len() as i64;
        let succeeded = window.iter().filter(|e| e.status_code < 400).count() as i64;
        let avg_latency_ms = if total == 0 {
            0.0
        } else {
            window.iter().map(|e| e.latency_ms as f64).sum::<f64>() / total as f64
        };
        Ok(LogStats {
            total,
            succeeded,
            failed: total - succeeded,
            avg_latency_ms,
        })
    }
}

#[async_trait]
impl AdminSessionStore for MemoryStore {
    async fn create_admin_session(
        &self,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), WirebridgeError> {
        self.inner
            .lock()
            .await
            .sessions
            .insert(token.to_string(), expires_at);
        Ok(())
    }

    async fn admin_session_valid(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, WirebridgeError> {
        let inner = self.inner.lock().await;
        Ok(inner.sessions.get(token).is_some_and(|exp| *exp > now))
    }

    async fn delete_admin_session(&self, token: &str) -> Result<(), WirebridgeError> {
        self.inner.lock().await.sessions.remove(token);
        Ok(())
    }

    async fn purge_expired_admin_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, WirebridgeError> {
        let mut inner = self.inner.lock().await;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, exp| *exp > now);
        Ok((before - inner.sessions.len()) as u64)
    }
}
