// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::debug;
use wirebridge_core::WirebridgeError;

use crate::migrations::run_migrations;

/// Handle to the gateway's SQLite database.
///
/// Cloning shares the same background connection thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path`, apply PRAGMAs and
    /// run pending migrations.
    pub async fn open(path: impl AsRef<Path>, wal_mode: bool) -> Result<Self, WirebridgeError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| WirebridgeError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(map_open_err)?;
        let db = Self { conn };
        db.prepare(wal_mode).await?;
        debug!(path = %path.display(), wal_mode, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database. Used by tests and `config check`.
    pub async fn open_in_memory() -> Result<Self, WirebridgeError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(map_open_err)?;
        let db = Self { conn };
        db.prepare(false).await?;
        Ok(db)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), WirebridgeError> {
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.busy_timeout(std::time::Duration::from_secs(5))?;
                conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;")?;
                if wal_mode {
                    // journal_mode returns a row, so it cannot go through execute_batch.
                    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
                }
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        self.conn
            .call(|conn| Ok(run_migrations(conn)))
            .await
            .map_err(map_tr_err)?
    }

    /// The shared async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the background connection.
    pub async fn close(self) -> Result<(), WirebridgeError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(map_tr_err)
    }
}

/// Convert tokio-rusqlite errors into [`WirebridgeError::Storage`].
fn map_open_err(e: rusqlite::Error) -> WirebridgeError {
    WirebridgeError::Storage {
        source: Box::new(e),
    }
}

pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> WirebridgeError {
    WirebridgeError::Storage {
        source: e.to_string().into(),
    }
}

pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.to_utc())
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
