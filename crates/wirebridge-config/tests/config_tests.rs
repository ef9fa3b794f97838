// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Wirebridge configuration system.

use figment::Jail;
use serial_test::serial;
use wirebridge_config::diagnostic::ConfigError;
use wirebridge_config::model::WirebridgeConfig;
use wirebridge_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[server]
host = "0.0.0.0"
port = 8080
model_name = "custom-model"
admin_password = "hunter2"

[backend]
ws_url = "ws://127.0.0.1:9000/socket.io/"
api_base = "http://127.0.0.1:9001"
connect_timeout_secs = 5
response_timeout_secs = 30
max_attempts = 2

[storage]
database_path = "/tmp/wb.db"
wal_mode = false

[rate_limit]
limit = 5
window_secs = 10

[watermark]
enabled = true
salt = "pepper"
tolerance_buckets = 2

[pool]
reset_utc_offset_minutes = 0

[attachments]
allow_private_hosts = true
max_bytes = 1024
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.model_name, "custom-model");
    assert_eq!(config.server.admin_password.as_deref(), Some("hunter2"));
    assert_eq!(config.backend.ws_url, "ws://127.0.0.1:9000/socket.io/");
    assert_eq!(config.backend.connect_timeout_secs, 5);
    assert_eq!(config.backend.max_attempts, 2);
    assert!(!config.storage.wal_mode);
    assert_eq!(config.rate_limit.limit, 5);
    assert_eq!(config.rate_limit.window_secs, 10);
    assert!(config.watermark.enabled);
    assert_eq!(config.watermark.salt, "pepper");
    assert_eq!(config.watermark.tolerance_buckets, 2);
    assert_eq!(config.pool.reset_utc_offset_minutes, 0);
    assert!(config.attachments.allow_private_hosts);
}

#[test]
fn empty_toml_gives_defaults() {
    let config = load_config_from_str("").expect("empty TOML is valid");
    let defaults = WirebridgeConfig::default();
    assert_eq!(config.server.port, defaults.server.port);
    assert_eq!(config.server.model_name, "vbdo-007");
    assert_eq!(config.backend.connect_timeout_secs, 15);
    assert_eq!(config.backend.locale, "zh-CN");
    assert_eq!(config.rate_limit.limit, 60);
    assert_eq!(config.watermark.salt, "vbdo-wm-2026");
    assert!(!config.watermark.enabled);
    assert_eq!(config.pool.reset_utc_offset_minutes, 480);
}

#[test]
fn unknown_key_gets_suggestion() {
    let toml = r#"
[watermark]
slat = "x"
"#;

    let errors = load_and_validate_str(toml).expect_err("unknown key must be rejected");
    let suggestion = errors.iter().find_map(|e| match e {
        ConfigError::UnknownKey { suggestion, .. } => suggestion.clone(),
        _ => None,
    });
    assert_eq!(suggestion.as_deref(), Some("salt"));
}

#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[server]
port = "eighty"
"#;
    let errors = load_and_validate_str(toml).expect_err("string port must be rejected");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. })),
        "expected InvalidType, got {errors:?}"
    );
}

#[test]
fn semantic_validation_runs_after_parse() {
    let toml = r#"
[rate_limit]
window_secs = 0
"#;
    let errors = load_and_validate_str(toml).expect_err("zero window must be rejected");
    assert!(errors[0].to_string().contains("rate_limit.window_secs"));
}

#[test]
#[serial]
fn env_overrides_file_values() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "custom.toml",
            r#"
[rate_limit]
limit = 10

[watermark]
salt = "from-file"
"#,
        )?;
        jail.set_env("WIREBRIDGE_RATE_LIMIT_LIMIT", "99");
        jail.set_env("WIREBRIDGE_WATERMARK_SALT", "from-env");
        jail.set_env("WIREBRIDGE_SERVER_PORT", "4242");

        let config = load_and_validate_path(std::path::Path::new("custom.toml"))
            .map_err(|e| format!("{e:?}"))?;
        assert_eq!(config.rate_limit.limit, 99);
        assert_eq!(config.watermark.salt, "from-env");
        assert_eq!(config.server.port, 4242);
        Ok(())
    });
}

#[test]
fn debug_output_hides_secrets() {
    let config = load_config_from_str(
        r#"
[server]
admin_password = "hunter2"
"#,
    )
    .unwrap();
    let out = format!("{config:?}");
    assert!(!out.contains("hunter2"));
    assert!(!out.contains("vbdo-wm-2026"));
}
