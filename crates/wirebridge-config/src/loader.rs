// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./wirebridge.toml` > `~/.config/wirebridge/wirebridge.toml` >
//! `/etc/wirebridge/wirebridge.toml` with environment variable overrides via `WIREBRIDGE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::WirebridgeConfig;

/// Config sections, in the order the env mapper tries them.
///
/// `rate_limit` is listed before anything that could prefix-match it.
const SECTIONS: &[&str] = &[
    "rate_limit",
    "server",
    "backend",
    "storage",
    "watermark",
    "pool",
    "attachments",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/wirebridge/wirebridge.toml` (system-wide)
/// 3. `~/.config/wirebridge/wirebridge.toml` (user XDG config)
/// 4. `./wirebridge.toml` (local directory)
/// 5. `WIREBRIDGE_*` environment variables
pub fn load_config() -> Result<WirebridgeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<WirebridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WirebridgeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<WirebridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WirebridgeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(WirebridgeConfig::default()))
        .merge(Toml::file("/etc/wirebridge/wirebridge.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("wirebridge/wirebridge.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("wirebridge.toml"))
        .merge(env_provider())
}

/// Map `WIREBRIDGE_<SECTION>_<KEY>` onto `section.key`.
///
/// figment hands over the prefix-stripped name in its original case, so it
/// is lowercased before matching.
///
/// Uses `Env::map()` rather than `Env::split("_")` because both section and
/// key names contain underscores (`WIREBRIDGE_RATE_LIMIT_WINDOW_SECS` must
/// become `rate_limit.window_secs`).
fn env_provider() -> Env {
    Env::prefixed("WIREBRIDGE_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key
}
