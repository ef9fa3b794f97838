// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::WirebridgeConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every problem rather than stopping at the first.
pub fn validate_config(config: &WirebridgeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("server.host must not be empty"));
    } else if host.parse::<std::net::IpAddr>().is_err()
        && !host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        errors.push(ConfigError::validation(format!(
            "server.host `{host}` is not a valid IP address or hostname"
        )));
    }

    if config.server.model_name.trim().is_empty() {
        errors.push(ConfigError::validation("server.model_name must not be empty"));
    }

    if matches!(&config.server.admin_password, Some(p) if p.is_empty()) {
        errors.push(ConfigError::validation(
            "server.admin_password must not be empty when set",
        ));
    }

    for (name, url, schemes) in [
        ("backend.ws_url", &config.backend.ws_url, &["ws://", "wss://"]),
        (
            "backend.api_base",
            &config.backend.api_base,
            &["http://", "https://"],
        ),
    ] {
        if !schemes.iter().any(|s| url.starts_with(s)) {
            errors.push(ConfigError::validation(format!(
                "{name} must start with {}, got `{url}`",
                schemes.join(" or ")
            )));
        }
    }

    if config.backend.connect_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "backend.connect_timeout_secs must be at least 1",
        ));
    }
    if config.backend.response_timeout_secs < config.backend.connect_timeout_secs {
        errors.push(ConfigError::validation(format!(
            "backend.response_timeout_secs ({}) must not be shorter than backend.connect_timeout_secs ({})",
            config.backend.response_timeout_secs, config.backend.connect_timeout_secs
        )));
    }
    if config.backend.max_attempts == 0 {
        errors.push(ConfigError::validation("backend.max_attempts must be at least 1"));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation("storage.database_path must not be empty"));
    }

    if config.rate_limit.limit < 1 {
        errors.push(ConfigError::validation(format!(
            "rate_limit.limit must be at least 1, got {}",
            config.rate_limit.limit
        )));
    }
    if config.rate_limit.window_secs < 1 {
        errors.push(ConfigError::validation(format!(
            "rate_limit.window_secs must be at least 1, got {}",
            config.rate_limit.window_secs
        )));
    }

    if config.watermark.enabled && config.watermark.salt.is_empty() {
        errors.push(ConfigError::validation(
            "watermark.salt must not be empty when watermark.enabled is true",
        ));
    }
    if config.watermark.tolerance_buckets < 0 {
        errors.push(ConfigError::validation(format!(
            "watermark.tolerance_buckets must be non-negative, got {}",
            config.watermark.tolerance_buckets
        )));
    }

    if !(-720..=840).contains(&config.pool.reset_utc_offset_minutes) {
        errors.push(ConfigError::validation(format!(
            "pool.reset_utc_offset_minutes must be between -720 and 840, got {}",
            config.pool.reset_utc_offset_minutes
        )));
    }

    if config.attachments.max_bytes == 0 {
        errors.push(ConfigError::validation("attachments.max_bytes must be at least 1"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&WirebridgeConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = WirebridgeConfig::default();
        config.rate_limit.limit = 0;
        config.backend.ws_url = "http://nope".into();
        config.pool.reset_utc_offset_minutes = 2000;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn enabled_watermark_needs_salt() {
        let mut config = WirebridgeConfig::default();
        config.watermark.enabled = true;
        config.watermark.salt.clear();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("watermark.salt"));
    }
}
