// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request log writes and reporting queries.

use chrono::{DateTime, Utc};
use rusqlite::params;
use wirebridge_core::{LogStats, RequestLogEntry, WirebridgeError, format_timestamp};

use crate::database::{Database, map_tr_err};

pub async fn append(db: &Database, entry: &RequestLogEntry) -> Result<(), WirebridgeError> {
    let e = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO request_logs
                 (caller_key_id, credential_id, endpoint, method, status_code, latency_ms,
                  client_ip, user_agent, error_message, system_prompt, user_prompt, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    e.caller_key_id,
                    e.credential_id,
                    e.endpoint,
                    e.method,
                    e.status_code,
                    e.latency_ms,
                    e.client_ip,
                    e.user_agent,
                    e.error_message,
                    e.system_prompt,
                    e.user_prompt,
                    e.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The `limit` most recent entries, newest first.
pub async fn recent(db: &Database, limit: usize) -> Result<Vec<RequestLogEntry>, WirebridgeError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, caller_key_id, credential_id, endpoint, method, status_code, latency_ms,
                        client_ip, user_agent, error_message, system_prompt, user_prompt, created_at
                 FROM request_logs ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(RequestLogEntry {
                    id: row.get(0)?,
                    caller_key_id: row.get(1)?,
                    credential_id: row.get(2)?,
                    endpoint: row.get(3)?,
                    method: row.get(4)?,
                    status_code: row.get(5)?,
                    latency_ms: row.get(6)?,
                    client_ip: row.get(7)?,
                    user_agent: row.get(8)?,
                    error_message: row.get(9)?,
                    system_prompt: row.get(10)?,
                    user_prompt: row.get(11)?,
                    created_at: row.get(12)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Totals for entries created at or after `since`. Status codes below 400 count as success.
pub async fn stats_since(db: &Database, since: DateTime<Utc>) -> Result<LogStats, WirebridgeError> {
    let since = format_timestamp(since);
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN status_code < 400 THEN 1 ELSE 0 END), 0),
                        COALESCE(AVG(latency_ms), 0.0)
                 FROM request_logs WHERE created_at >= ?1",
                params![since],
                |row| {
                    let total: i64 = row.get(0)?;
                    let succeeded: i64 = row.get(1)?;
                    Ok(LogStats {
                        total,
                        succeeded,
                        failed: total - succeeded,
                        avg_latency_ms: row.get(2)?,
                    })
                },
            )
        })
        .await
        .map_err(map_tr_err)
}
