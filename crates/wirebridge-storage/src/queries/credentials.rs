// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend credential CRUD and usage counters.

use chrono::NaiveDate;
use rusqlite::{Row, params};
use wirebridge_core::{BackendCredential, WirebridgeError, format_timestamp};

use crate::database::{Database, map_tr_err};

const COLUMNS: &str =
    "id, label, token, daily_quota, used_count, active, last_reset_date, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<BackendCredential> {
    let last_reset: Option<String> = row.get(6)?;
    let last_reset_date = match last_reset {
        Some(raw) => Some(raw.parse::<NaiveDate>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?),
        None => None,
    };
    Ok(BackendCredential {
        id: row.get(0)?,
        label: row.get(1)?,
        token: row.get(2)?,
        daily_quota: row.get(3)?,
        used_count: row.get(4)?,
        active: row.get(5)?,
        last_reset_date,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// List all credentials, oldest first.
pub async fn list_credentials(db: &Database) -> Result<Vec<BackendCredential>, WirebridgeError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM credentials ORDER BY created_at, id"
            ))?;
            let rows = stmt.query_map([], from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Get a credential by ID.
pub async fn get_credential(
    db: &Database,
    id: &str,
) -> Result<Option<BackendCredential>, WirebridgeError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                &format!("SELECT {COLUMNS} FROM credentials WHERE id = ?1"),
                params![id],
                from_row,
            );
            match result {
                Ok(cred) => Ok(Some(cred)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a new credential.
pub async fn insert_credential(
    db: &Database,
    cred: &BackendCredential,
) -> Result<(), WirebridgeError> {
    let cred = cred.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO credentials
                 (id, label, token, daily_quota, used_count, active, last_reset_date, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    cred.id,
                    cred.label,
                    cred.token,
                    cred.daily_quota,
                    cred.used_count,
                    cred.active,
                    cred.last_reset_date.map(|d| d.to_string()),
                    cred.created_at,
                    cred.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Overwrite label, token, quota, used count, and active flag.
pub async fn update_credential(
    db: &Database,
    cred: &BackendCredential,
) -> Result<bool, WirebridgeError> {
    let cred = cred.clone();
    let now = format_timestamp(chrono::Utc::now());
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE credentials
                 SET label = ?2, token = ?3, daily_quota = ?4, used_count = ?5, active = ?6, updated_at = ?7
                 WHERE id = ?1",
                params![
                    cred.id,
                    cred.label,
                    cred.token,
                    cred.daily_quota,
                    cred.used_count,
                    cred.active,
                    now,
                ],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a credential by ID.
pub async fn delete_credential(db: &Database, id: &str) -> Result<bool, WirebridgeError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute("DELETE FROM credentials WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Add one to the used count in a single statement.
pub async fn increment_usage(db: &Database, id: &str) -> Result<(), WirebridgeError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE credentials SET used_count = used_count + 1 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Zero the used count of every credential not yet reset on `today`.
///
/// The date guard lives in the WHERE clause, so concurrent callers reset a
/// given credential at most once per date.
pub async fn reset_daily_usage(db: &Database, today: NaiveDate) -> Result<u64, WirebridgeError> {
    let today = today.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE credentials SET used_count = 0, last_reset_date = ?1
                 WHERE last_reset_date IS NULL OR last_reset_date != ?1",
                params![today],
            )?;
            Ok(changed as u64)
        })
        .await
        .map_err(map_tr_err)
}
