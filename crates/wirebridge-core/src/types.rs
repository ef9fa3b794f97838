// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Records shared between the gateway core and its persistence collaborator.
//!
//! Timestamps that are only displayed are kept as RFC 3339 strings; values the
//! core compares against the clock use chrono types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Canonical timestamp rendering: RFC 3339, UTC, millisecond precision.
///
/// Fixed width, so string order matches chronological order in storage.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Quota value meaning "no limit" for caller keys.
pub const UNLIMITED_QUOTA: i64 = -1;

/// A pooled bearer token for the realtime backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCredential {
    pub id: String,
    pub label: String,
    pub token: String,
    pub daily_quota: i64,
    pub used_count: i64,
    pub active: bool,
    /// Calendar date (in the pool's reference offset) of the last usage reset.
    pub last_reset_date: Option<NaiveDate>,
    pub created_at: String,
    pub updated_at: String,
}

impl std::fmt::Debug for BackendCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendCredential")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("token", &"[redacted]")
            .field("daily_quota", &self.daily_quota)
            .field("used_count", &self.used_count)
            .field("active", &self.active)
            .field("last_reset_date", &self.last_reset_date)
            .finish()
    }
}

/// A key issued to a downstream caller.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerKey {
    pub id: String,
    pub name: String,
    pub secret: String,
    /// `-1` means unlimited.
    pub quota: i64,
    pub used_count: i64,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: String,
    pub updated_at: String,
}

impl CallerKey {
    pub fn is_unlimited(&self) -> bool {
        self.quota == UNLIMITED_QUOTA
    }
}

impl std::fmt::Debug for CallerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallerKey")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("secret", &"[redacted]")
            .field("quota", &self.quota)
            .field("used_count", &self.used_count)
            .field("active", &self.active)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// What a rate window is keyed on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RateKind {
    Ip,
    ApiKey,
}

/// Whether a backend attachment is rendered inline as an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    File,
}

impl AttachmentKind {
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            AttachmentKind::Image
        } else {
            AttachmentKind::File
        }
    }
}

/// A file hosted by the backend, referenced from the outgoing user message.
///
/// Serializes to the exact object shape the backend expects in `attachments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    pub filename: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub url: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
}

/// One line of the request log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    /// Assigned by storage on insert.
    pub id: Option<i64>,
    pub caller_key_id: Option<String>,
    pub credential_id: Option<String>,
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub latency_ms: i64,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub error_message: Option<String>,
    pub system_prompt: Option<String>,
    pub user_prompt: Option<String>,
    pub created_at: String,
}

/// Aggregate counters over a slice of the request log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogStats {
    pub total: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub avg_latency_ms: f64,
}

/// Reporting window for [`LogStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    Today,
    Week,
    Month,
}
