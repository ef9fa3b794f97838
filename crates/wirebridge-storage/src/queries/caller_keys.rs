// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caller key CRUD and usage counters.

use rusqlite::{Row, params};
use wirebridge_core::{CallerKey, WirebridgeError, format_timestamp};

use crate::database::{Database, map_tr_err, parse_timestamp};

const COLUMNS: &str =
    "id, name, secret, quota, used_count, active, expires_at, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<CallerKey> {
    let expires_at: Option<String> = row.get(6)?;
    Ok(CallerKey {
        id: row.get(0)?,
        name: row.get(1)?,
        secret: row.get(2)?,
        quota: row.get(3)?,
        used_count: row.get(4)?,
        active: row.get(5)?,
        expires_at: expires_at.map(|raw| parse_timestamp(6, &raw)).transpose()?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

async fn get_where(
    db: &Database,
    column: &'static str,
    value: &str,
) -> Result<Option<CallerKey>, WirebridgeError> {
    let value = value.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                &format!("SELECT {COLUMNS} FROM caller_keys WHERE {column} = ?1"),
                params![value],
                from_row,
            );
            match result {
                Ok(key) => Ok(Some(key)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Look a key up by its secret.
pub async fn get_by_secret(db: &Database, secret: &str) -> Result<Option<CallerKey>, WirebridgeError> {
    get_where(db, "secret", secret).await
}

/// Look a key up by ID.
pub async fn get_key(db: &Database, id: &str) -> Result<Option<CallerKey>, WirebridgeError> {
    get_where(db, "id", id).await
}

/// All keys, newest first.
pub async fn list_keys(db: &Database) -> Result<Vec<CallerKey>, WirebridgeError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM caller_keys ORDER BY created_at DESC, id"
            ))?;
            let rows = stmt.query_map([], from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a key, reporting a duplicate secret as [`WirebridgeError::Conflict`].
pub async fn insert_key(db: &Database, key: &CallerKey) -> Result<(), WirebridgeError> {
    let key = key.clone();
    let inserted = db
        .connection()
        .call(move |conn| {
            let result = conn.execute(
                "INSERT INTO caller_keys
                 (id, name, secret, quota, used_count, active, expires_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    key.id,
                    key.name,
                    key.secret,
                    key.quota,
                    key.used_count,
                    key.active,
                    key.expires_at.map(format_timestamp),
                    key.created_at,
                    key.updated_at,
                ],
            );
            match result {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)?;

    if inserted {
        Ok(())
    } else {
        Err(WirebridgeError::Conflict("caller key already exists".into()))
    }
}

/// Overwrite name, quota, used count, active flag, and expiry. The secret is immutable.
pub async fn update_key(db: &Database, key: &CallerKey) -> Result<bool, WirebridgeError> {
    let key = key.clone();
    let now = format_timestamp(chrono::Utc::now());
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE caller_keys
                 SET name = ?2, quota = ?3, used_count = ?4, active = ?5, expires_at = ?6, updated_at = ?7
                 WHERE id = ?1",
                params![
                    key.id,
                    key.name,
                    key.quota,
                    key.used_count,
                    key.active,
                    key.expires_at.map(format_timestamp),
                    now,
                ],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_key(db: &Database, id: &str) -> Result<bool, WirebridgeError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute("DELETE FROM caller_keys WHERE id = ?1", params![id])?;
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
                "UPDATE caller_keys SET used_count = used_count + 1 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
