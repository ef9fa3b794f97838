// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Expiring admin login sessions.

use chrono::{DateTime, Utc};
use rusqlite::params;
use wirebridge_core::{WirebridgeError, format_timestamp};

use crate::database::{Database, map_tr_err};

pub async fn create_session(
    db: &Database,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), WirebridgeError> {
    let token = token.to_string();
    let created_at = format_timestamp(Utc::now());
    let expires_at = format_timestamp(expires_at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO admin_sessions (token, created_at, expires_at) VALUES (?1, ?2, ?3)",
                params![token, created_at, expires_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Whether `token` names a session that is still live at `now`.
pub async fn session_valid(
    db: &Database,
    token: &str,
    now: DateTime<Utc>,
) -> Result<bool, WirebridgeError> {
    let token = token.to_string();
    let now = format_timestamp(now);
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM admin_sessions WHERE token = ?1 AND expires_at > ?2",
                params![token, now],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_session(db: &Database, token: &str) -> Result<(), WirebridgeError> {
    let token = token.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM admin_sessions WHERE token = ?1", params![token])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn purge_expired(db: &Database, now: DateTime<Utc>) -> Result<u64, WirebridgeError> {
    let now = format_timestamp(now);
    db.connection()
        .call(move |conn| {
            let removed =
                conn.execute("DELETE FROM admin_sessions WHERE expires_at <= ?1", params![now])?;
            Ok(removed as u64)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn session_lifecycle() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now();
        create_session(&db, "live", now + Duration::hours(1)).await.unwrap();
        create_session(&db, "stale", now - Duration::seconds(1)).await.unwrap();

        assert!(session_valid(&db, "live", now).await.unwrap());
        assert!(!session_valid(&db, "stale", now).await.unwrap());
        assert!(!session_valid(&db, "unknown", now).await.unwrap());

        assert_eq!(purge_expired(&db, now).await.unwrap(), 1);
        delete_session(&db, "live").await.unwrap();
        assert!(!session_valid(&db, "live", now).await.unwrap());
    }
}
