// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Wirebridge gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Wirebridge configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WirebridgeConfig {
    /// HTTP listener and caller-facing settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Realtime backend connection settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-caller fixed-window rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// System prompt watermark verification.
    #[serde(default)]
    pub watermark: WatermarkConfig,

    /// Backend credential pool settings.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Attachment upload pipeline settings.
    #[serde(default)]
    pub attachments: AttachmentConfig,
}

/// HTTP listener configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the HTTP listener.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// The single model id advertised and accepted.
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Password for the admin API. `None` disables the admin routes.
    #[serde(default)]
    pub admin_password: Option<String>,

    /// Lifetime of an admin login session.
    #[serde(default = "default_admin_session_ttl_secs")]
    pub admin_session_ttl_secs: u64,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("model_name", &self.model_name)
            .field(
                "admin_password",
                &self.admin_password.as_ref().map(|_| "[redacted]"),
            )
            .field("admin_session_ttl_secs", &self.admin_session_ttl_secs)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            model_name: default_model_name(),
            admin_password: None,
            admin_session_ttl_secs: default_admin_session_ttl_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_model_name() -> String {
    "vbdo-007".to_string()
}

fn default_admin_session_ttl_secs() -> u64 {
    86_400
}

/// Realtime backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Websocket endpoint, without query string.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Base URL of the backend's HTTP API (upload sub-protocol).
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Value for the `origin`/`referer` headers on upload calls.
    #[serde(default = "default_origin")]
    pub origin: String,

    #[serde(default = "default_locale")]
    pub locale: String,

    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Minutes, in the backend's sign convention (`-480` for UTC+8).
    #[serde(default = "default_timezone_offset")]
    pub timezone_offset: String,

    #[serde(default = "default_client_type")]
    pub client_type: String,

    #[serde(default)]
    pub branch: String,

    #[serde(default = "default_task_mode")]
    pub task_mode: String,

    #[serde(default = "default_country_iso")]
    pub country_iso: String,

    /// Seconds to wait for the handshake confirmation.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Seconds a whole bridge session may run.
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,

    /// Attempts for aggregate (non-streaming) calls, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt; doubles per retry.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            api_base: default_api_base(),
            origin: default_origin(),
            locale: default_locale(),
            timezone: default_timezone(),
            timezone_offset: default_timezone_offset(),
            client_type: default_client_type(),
            branch: String::new(),
            task_mode: default_task_mode(),
            country_iso: default_country_iso(),
            connect_timeout_secs: default_connect_timeout_secs(),
            response_timeout_secs: default_response_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

fn default_ws_url() -> String {
    "wss://api.manus.im/socket.io/".to_string()
}

fn default_api_base() -> String {
    "https://api.manus.im".to_string()
}

fn default_origin() -> String {
    "https://manus.im".to_string()
}

fn default_locale() -> String {
    "zh-CN".to_string()
}

fn default_timezone() -> String {
    "Asia/Hong_Kong".to_string()
}

fn default_timezone_offset() -> String {
    "-480".to_string()
}

fn default_client_type() -> String {
    "web".to_string()
}

fn default_task_mode() -> String {
    "discuss".to_string()
}

fn default_country_iso() -> String {
    "HK".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_response_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    250
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("wirebridge").join("wirebridge.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("wirebridge.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Fixed-window rate limit configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests allowed per window and identity.
    #[serde(default = "default_rate_limit")]
    pub limit: i64,

    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: i64,

    /// How often stale windows are purged.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,

    /// Windows older than this are purged.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: default_rate_limit(),
            window_secs: default_window_secs(),
            purge_interval_secs: default_purge_interval_secs(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_rate_limit() -> i64 {
    60
}

fn default_window_secs() -> i64 {
    60
}

fn default_purge_interval_secs() -> u64 {
    600
}

fn default_max_age_secs() -> i64 {
    3600
}

/// Watermark verification configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WatermarkConfig {
    /// Reject (with a decoy reply) system prompts lacking a valid watermark.
    #[serde(default)]
    pub enabled: bool,

    /// Shared salt mixed into every signature.
    #[serde(default = "default_salt")]
    pub salt: String,

    /// Allowed distance, in one-minute buckets, between signer and verifier clocks.
    #[serde(default = "default_tolerance_buckets")]
    pub tolerance_buckets: i64,

    /// Text returned in place of a real answer when verification fails.
    #[serde(default = "default_decoy_reply")]
    pub decoy_reply: String,
}

impl std::fmt::Debug for WatermarkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkConfig")
            .field("enabled", &self.enabled)
            .field("salt", &"[redacted]")
            .field("tolerance_buckets", &self.tolerance_buckets)
            .field("decoy_reply", &self.decoy_reply)
            .finish()
    }
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            salt: default_salt(),
            tolerance_buckets: default_tolerance_buckets(),
            decoy_reply: default_decoy_reply(),
        }
    }
}

fn default_salt() -> String {
    "vbdo-wm-2026".to_string()
}

fn default_tolerance_buckets() -> i64 {
    1
}

fn default_decoy_reply() -> String {
    "Sorry, I can't help with that right now. Please try again later.".to_string()
}

/// Credential pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// UTC offset, in minutes, whose calendar date drives the daily reset.
    #[serde(default = "default_reset_utc_offset_minutes")]
    pub reset_utc_offset_minutes: i32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            reset_utc_offset_minutes: default_reset_utc_offset_minutes(),
        }
    }
}

fn default_reset_utc_offset_minutes() -> i32 {
    480
}

/// Attachment pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentConfig {
    /// Permit downloads from loopback and private addresses.
    #[serde(default)]
    pub allow_private_hosts: bool,

    /// Largest attachment accepted, in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            allow_private_hosts: false,
            max_bytes: default_max_bytes(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

fn default_max_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_download_timeout_secs() -> u64 {
    30
}
