// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Wirebridge gateway.
//!
//! TOML files from the XDG hierarchy are merged over compiled defaults, then
//! `WIREBRIDGE_*` environment variables override individual keys. Unknown keys
//! are rejected and rendered as miette diagnostics with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use wirebridge_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("listening on {}:{}", config.server.host, config.server.port);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::WirebridgeConfig;

/// Load configuration from the XDG hierarchy and validate it.
pub fn load_and_validate() -> Result<WirebridgeConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(
            err,
            &collect_toml_sources(),
        )),
    }
}

/// Load configuration from an explicit file, with env overrides, and validate it.
pub fn load_and_validate_path(
    path: &std::path::Path,
) -> Result<WirebridgeConfig, Vec<ConfigError>> {
    match loader::load_config_from_path(path) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = std::fs::read_to_string(path)
                .map(|c| vec![(path.display().to_string(), c)])
                .unwrap_or_default();
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<WirebridgeConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

fn collect_toml_sources() -> Vec<(String, String)> {
    let mut candidates = vec![std::path::PathBuf::from("/etc/wirebridge/wirebridge.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join("wirebridge/wirebridge.toml"));
    }
    candidates.push(
        std::env::current_dir()
            .map(|d| d.join("wirebridge.toml"))
            .unwrap_or_else(|_| "wirebridge.toml".into()),
    );

    candidates
        .into_iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(&path).ok()?;
            Some((path.display().to_string(), content))
        })
        .collect()
}
