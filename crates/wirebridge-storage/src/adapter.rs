// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the store traits.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use wirebridge_config::model::StorageConfig;
use wirebridge_core::{
    AdminSessionStore, BackendCredential, CallerKey, CallerKeyStore, CredentialStore,
    HealthStatus, LogStats, PluginAdapter, RateKind, RateLimitStore, RequestLog, RequestLogEntry,
    StorageAdapter, WirebridgeError,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened lazily by [`StorageAdapter::initialize`]; every
/// store method fails until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a storage adapter; the database is not opened yet.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wrap an already-open database (in-memory tests, CLI one-shots).
    pub fn from_database(db: Database) -> Self {
        Self {
            config: StorageConfig {
                database_path: ":memory:".into(),
                wal_mode: false,
            },
            db: OnceCell::new_with(Some(db)),
        }
    }

    fn db(&self) -> Result<&Database, WirebridgeError> {
        self.db.get().ok_or_else(|| WirebridgeError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(&self) -> Result<(), WirebridgeError> {
        if let Some(db) = self.db.get() {
            db.connection()
                .call(|conn| -> Result<(), rusqlite::Error> {
                    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                    Ok(())
                })
                .await
                .map_err(map_tr_err)?;
            debug!("WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn health_check(&self) -> Result<HealthStatus, WirebridgeError> {
        let Ok(db) = self.db() else {
            return Ok(HealthStatus::Unhealthy("not initialized".into()));
        };
        let probe = db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await;
        Ok(match probe {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), WirebridgeError> {
        self.checkpoint().await
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), WirebridgeError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| WirebridgeError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), WirebridgeError> {
        self.db()?;
        self.checkpoint().await
    }
}

#[async_trait]
impl CredentialStore for SqliteStorage {
    async fn list_credentials(&self) -> Result<Vec<BackendCredential>, WirebridgeError> {
        queries::credentials::list_credentials(self.db()?).await
    }

    async fn get_credential(
        &self,
        id: &str,
    ) -> Result<Option<BackendCredential>, WirebridgeError> {
        queries::credentials::get_credential(self.db()?, id).await
    }

    async fn insert_credential(
        &self,
        credential: &BackendCredential,
    ) -> Result<(), WirebridgeError> {
        queries::credentials::insert_credential(self.db()?, credential).await
    }

    async fn update_credential(
        &self,
        credential: &BackendCredential,
    ) -> Result<bool, WirebridgeError> {
        queries::credentials::update_credential(self.db()?, credential).await
    }

    async fn delete_credential(&self, id: &str) -> Result<bool, WirebridgeError> {
        queries::credentials::delete_credential(self.db()?, id).await
    }

    async fn increment_credential_usage(&self, id: &str) -> Result<(), WirebridgeError> {
        queries::credentials::increment_usage(self.db()?, id).await
    }

    async fn reset_daily_usage(&self, today: NaiveDate) -> Result<u64, WirebridgeError> {
        queries::credentials::reset_daily_usage(self.db()?, today).await
    }
}

#[async_trait]
impl CallerKeyStore for SqliteStorage {
    async fn get_key_by_secret(&self, secret: &str) -> Result<Option<CallerKey>, WirebridgeError> {
        queries::caller_keys::get_by_secret(self.db()?, secret).await
    }

    async fn get_key(&self, id: &str) -> Result<Option<CallerKey>, WirebridgeError> {
        queries::caller_keys::get_key(self.db()?, id).await
    }

    async fn list_keys(&self) -> Result<Vec<CallerKey>, WirebridgeError> {
        queries::caller_keys::list_keys(self.db()?).await
    }

    async fn insert_key(&self, key: &CallerKey) -> Result<(), WirebridgeError> {
        queries::caller_keys::insert_key(self.db()?, key).await
    }

    async fn update_key(&self, key: &CallerKey) -> Result<bool, WirebridgeError> {
        queries::caller_keys::update_key(self.db()?, key).await
    }

    async fn delete_key(&self, id: &str) -> Result<bool, WirebridgeError> {
        queries::caller_keys::delete_key(self.db()?, id).await
    }

    async fn increment_key_usage(&self, id: &str) -> Result<(), WirebridgeError> {
        queries::caller_keys::increment_usage(self.db()?, id).await
    }
}

#[async_trait]
impl RateLimitStore for SqliteStorage {
    async fn window_count(
        &self,
        identity: &str,
        kind: RateKind,
        window_start: i64,
    ) -> Result<i64, WirebridgeError> {
        queries::rate_limits::window_count(self.db()?, identity, kind, window_start).await
    }

    async fn increment_window(
        &self,
        identity: &str,
        kind: RateKind,
        window_start: i64,
    ) -> Result<i64, WirebridgeError> {
        queries::rate_limits::increment_window(self.db()?, identity, kind, window_start).await
    }

    async fn purge_windows_before(&self, cutoff: i64) -> Result<u64, WirebridgeError> {
        queries::rate_limits::purge_before(self.db()?, cutoff).await
    }
}

#[async_trait]
impl RequestLog for SqliteStorage {
    async fn append_log(&self, entry: &RequestLogEntry) -> Result<(), WirebridgeError> {
        queries::request_logs::append(self.db()?, entry).await
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<RequestLogEntry>, WirebridgeError> {
        queries::request_logs::recent(self.db()?, limit).await
    }

    async fn log_stats(&self, since: DateTime<Utc>) -> Result<LogStats, WirebridgeError> {
        queries::request_logs::stats_since(self.db()?, since).await
    }
}

#[async_trait]
impl AdminSessionStore for SqliteStorage {
    async fn create_admin_session(
        &self,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), WirebridgeError> {
        queries::admin_sessions::create_session(self.db()?, token, expires_at).await
    }

    async fn admin_session_valid(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, WirebridgeError> {
        queries::admin_sessions::session_valid(self.db()?, token, now).await
    }

    async fn delete_admin_session(&self, token: &str) -> Result<(), WirebridgeError> {
        queries::admin_sessions::delete_session(self.db()?, token).await
    }

    async fn purge_expired_admin_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, WirebridgeError> {
        queries::admin_sessions::purge_expired(self.db()?, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn identity() {
        let storage = SqliteStorage::new(make_config("unused.db"));
        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
    }

    #[tokio::test]
    async fn uninitialized_storage_reports_unhealthy_and_rejects_queries() {
        let storage = SqliteStorage::new(make_config("unused.db"));
        assert!(matches!(
            storage.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
        assert!(storage.list_keys().await.is_err());
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(db_path.exists());
        assert!(storage.initialize().await.is_err());
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
        storage.close().await.unwrap();
    }
}
