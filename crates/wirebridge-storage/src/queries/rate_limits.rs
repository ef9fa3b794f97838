// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-window counters keyed by (identity, kind, window start).

use rusqlite::{OptionalExtension, params};
use wirebridge_core::{RateKind, WirebridgeError};

use crate::database::{Database, map_tr_err};

/// Current count for a window; zero when the window has no row yet.
pub async fn window_count(
    db: &Database,
    identity: &str,
    kind: RateKind,
    window_start: i64,
) -> Result<i64, WirebridgeError> {
    let identity = identity.to_string();
    let kind = kind.to_string();
    db.connection()
        .call(move |conn| {
            let count: Option<i64> = conn
                .query_row(
                    "SELECT request_count FROM rate_limits
                     WHERE identity = ?1 AND kind = ?2 AND window_start = ?3",
                    params![identity, kind, window_start],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(count.unwrap_or(0))
        })
        .await
        .map_err(map_tr_err)
}

/// Create-with-one or add-one, returning the post-increment count.
pub async fn increment_window(
    db: &Database,
    identity: &str,
    kind: RateKind,
    window_start: i64,
) -> Result<i64, WirebridgeError> {
    let identity = identity.to_string();
    let kind = kind.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "INSERT INTO rate_limits (identity, kind, window_start, request_count)
                 VALUES (?1, ?2, ?3, 1)
                 ON CONFLICT (identity, kind, window_start)
                 DO UPDATE SET request_count = request_count + 1
                 RETURNING request_count",
                params![identity, kind, window_start],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Delete every window that started before `cutoff`.
pub async fn purge_before(db: &Database, cutoff: i64) -> Result<u64, WirebridgeError> {
    db.connection()
        .call(move |conn| {
            let removed =
                conn.execute("DELETE FROM rate_limits WHERE window_start < ?1", params![cutoff])?;
            Ok(removed as u64)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_counts_per_window_and_kind() {
        let db = Database::open_in_memory().await.unwrap();
        assert_eq!(window_count(&db, "k1", RateKind::ApiKey, 60).await.unwrap(), 0);

        assert_eq!(increment_window(&db, "k1", RateKind::ApiKey, 60).await.unwrap(), 1);
        assert_eq!(increment_window(&db, "k1", RateKind::ApiKey, 60).await.unwrap(), 2);
        assert_eq!(increment_window(&db, "k1", RateKind::Ip, 60).await.unwrap(), 1);
        assert_eq!(increment_window(&db, "k1", RateKind::ApiKey, 120).await.unwrap(), 1);

        assert_eq!(window_count(&db, "k1", RateKind::ApiKey, 60).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn purge_drops_only_old_windows() {
        let db = Database::open_in_memory().await.unwrap();
        increment_window(&db, "a", RateKind::Ip, 0).await.unwrap();
        increment_window(&db, "a", RateKind::Ip, 60).await.unwrap();
        increment_window(&db, "a", RateKind::Ip, 120).await.unwrap();

        assert_eq!(purge_before(&db, 120).await.unwrap(), 2);
        assert_eq!(window_count(&db, "a", RateKind::Ip, 120).await.unwrap(), 1);
    }
}
