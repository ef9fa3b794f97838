// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wirebridge - OpenAI-compatible gateway for a realtime agent backend.
//!
//! This is the binary entry point: the gateway server plus operator
//! commands for credentials, caller keys, watermarks, and request logs.

mod manage;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wirebridge_config::WirebridgeConfig;

/// Wirebridge - OpenAI-compatible gateway for a realtime agent backend.
#[derive(Parser, Debug)]
#[command(name = "wirebridge", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gateway server.
    Serve,
    /// Manage backend credentials.
    #[command(subcommand)]
    Credential(CredentialCommand),
    /// Manage caller keys.
    #[command(subcommand)]
    Key(KeyCommand),
    /// Watermark tooling.
    #[command(subcommand)]
    Watermark(WatermarkCommand),
    /// Show recent request log entries.
    Logs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show request totals for today, this week, and this month.
    Stats,
    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum CredentialCommand {
    /// Add a backend credential to the pool.
    Add {
        #[arg(long)]
        label: String,
        #[arg(long)]
        token: String,
        /// Daily request quota (default 500).
        #[arg(long)]
        quota: Option<i64>,
    },
    /// List pooled credentials (tokens masked).
    List,
    /// Take a credential out of rotation.
    Disable { id: String },
}

#[derive(Subcommand, Debug)]
enum KeyCommand {
    /// Issue a caller key. The secret is printed once.
    Create {
        #[arg(long)]
        name: String,
        /// Lifetime request quota; omit for unlimited.
        #[arg(long)]
        quota: Option<i64>,
        /// Expiry as RFC 3339 or YYYY-MM-DD.
        #[arg(long)]
        expires_at: Option<String>,
    },
    /// List caller keys (secrets masked).
    List,
    /// Reject a key from now on.
    Disable { id: String },
}

#[derive(Subcommand, Debug)]
enum WatermarkCommand {
    /// Append a current watermark to a system prompt.
    Sign {
        #[arg(long)]
        prompt: String,
        /// Override the configured salt.
        #[arg(long)]
        salt: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate configuration and print the effective values.
    Check,
}

fn load_config(path: Option<&std::path::Path>) -> WirebridgeConfig {
    let loaded = match path {
        Some(path) => wirebridge_config::load_and_validate_path(path),
        None => wirebridge_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            wirebridge_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Credential(cmd)) => match cmd {
            CredentialCommand::Add {
                label,
                token,
                quota,
            } => manage::credential_add(&config, &label, &token, quota).await,
            CredentialCommand::List => manage::credential_list(&config).await,
            CredentialCommand::Disable { id } => manage::credential_disable(&config, &id).await,
        },
        Some(Commands::Key(cmd)) => match cmd {
            KeyCommand::Create {
                name,
                quota,
                expires_at,
            } => manage::key_create(&config, &name, quota, expires_at.as_deref()).await,
            KeyCommand::List => manage::key_list(&config).await,
            KeyCommand::Disable { id } => manage::key_disable(&config, &id).await,
        },
        Some(Commands::Watermark(WatermarkCommand::Sign { prompt, salt })) => {
            manage::watermark_sign(&config, &prompt, salt.as_deref());
            Ok(())
        }
        Some(Commands::Logs { limit }) => manage::logs(&config, limit).await,
        Some(Commands::Stats) => manage::stats(&config).await,
        Some(Commands::Config(ConfigCommand::Check)) => {
            println!("configuration OK");
            println!("{config:#?}");
            Ok(())
        }
        None => {
            println!("wirebridge: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("wirebridge: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_key_create() {
        let cli = Cli::try_parse_from([
            "wirebridge",
            "key",
            "create",
            "--name",
            "partner",
            "--quota",
            "100",
            "--expires-at",
            "2027-01-01",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Key(KeyCommand::Create {
                name,
                quota,
                expires_at,
            })) => {
                assert_eq!(name, "partner");
                assert_eq!(quota, Some(100));
                assert_eq!(expires_at.as_deref(), Some("2027-01-01"));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["wirebridge", "logs", "--config", "/tmp/wb.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/wb.toml")));
        assert!(matches!(cli.command, Some(Commands::Logs { limit: 20 })));
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = wirebridge_config::load_and_validate_str("").expect("defaults are valid");
        assert_eq!(config.server.model_name, "vbdo-007");
    }
}
