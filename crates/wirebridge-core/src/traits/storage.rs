// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence traits for credentials, caller keys, rate windows, the request
//! log, and admin sessions.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::WirebridgeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{BackendCredential, CallerKey, LogStats, RateKind, RequestLogEntry};

/// Adapter for storage and persistence backends.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), WirebridgeError>;

    /// Closes the storage backend, flushing pending writes and releasing connections.
    async fn close(&self) -> Result<(), WirebridgeError>;
}

/// Backend credential records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn list_credentials(&self) -> Result<Vec<BackendCredential>, WirebridgeError>;

    async fn get_credential(&self, id: &str)
    -> Result<Option<BackendCredential>, WirebridgeError>;

    async fn insert_credential(&self, credential: &BackendCredential)
    -> Result<(), WirebridgeError>;

    /// Replaces the mutable fields. Returns `false` when no row matched.
    async fn update_credential(
        &self,
        credential: &BackendCredential,
    ) -> Result<bool, WirebridgeError>;

    async fn delete_credential(&self, id: &str) -> Result<bool, WirebridgeError>;

    /// Atomically adds one to the used count.
    async fn increment_credential_usage(&self, id: &str) -> Result<(), WirebridgeError>;

    /// Zeroes the used count of every credential whose last reset date differs
    /// from `today`, stamping `today`. Returns the number of rows reset.
    async fn reset_daily_usage(&self, today: NaiveDate) -> Result<u64, WirebridgeError>;
}

/// Caller key records.
#[async_trait]
pub trait CallerKeyStore: Send + Sync {
    async fn get_key_by_secret(&self, secret: &str) -> Result<Option<CallerKey>, WirebridgeError>;

    async fn get_key(&self, id: &str) -> Result<Option<CallerKey>, WirebridgeError>;

    async fn list_keys(&self) -> Result<Vec<CallerKey>, WirebridgeError>;

    /// Fails with [`WirebridgeError::Conflict`] when the secret is already taken.
    async fn insert_key(&self, key: &CallerKey) -> Result<(), WirebridgeError>;

    async fn update_key(&self, key: &CallerKey) -> Result<bool, WirebridgeError>;

    async fn delete_key(&self, id: &str) -> Result<bool, WirebridgeError>;

    /// Atomically adds one to the used count.
    async fn increment_key_usage(&self, id: &str) -> Result<(), WirebridgeError>;
}

/// Fixed-window request counters.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count recorded for the window, zero when absent.
    async fn window_count(
        &self,
        identity: &str,
        kind: RateKind,
        window_start: i64,
    ) -> Result<i64, WirebridgeError>;

    /// Creates the window with a count of one or adds one. Returns the new count.
    async fn increment_window(
        &self,
        identity: &str,
        kind: RateKind,
        window_start: i64,
    ) -> Result<i64, WirebridgeError>;

    /// Drops windows that started before `cutoff` (unix seconds).
    async fn purge_windows_before(&self, cutoff: i64) -> Result<u64, WirebridgeError>;
}

/// Append-only request log.
#[async_trait]
pub trait RequestLog: Send + Sync {
    async fn append_log(&self, entry: &RequestLogEntry) -> Result<(), WirebridgeError>;

    /// Most recent entries first.
    async fn recent_logs(&self, limit: usize) -> Result<Vec<RequestLogEntry>, WirebridgeError>;

    async fn log_stats(&self, since: DateTime<Utc>) -> Result<LogStats, WirebridgeError>;
}

/// Expiring admin login sessions.
#[async_trait]
pub trait AdminSessionStore: Send + Sync {
    async fn create_admin_session(
        &self,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), WirebridgeError>;

    /// `true` when the token exists and has not expired at `now`.
    async fn admin_session_valid(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, WirebridgeError>;

    async fn delete_admin_session(&self, token: &str) -> Result<(), WirebridgeError>;

    async fn purge_expired_admin_sessions(&self, now: DateTime<Utc>)
    -> Result<u64, WirebridgeError>;
}
