// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `wirebridge serve` command implementation.
//!
//! Opens SQLite storage, builds the orchestrator and HTTP router, and runs
//! until SIGINT/SIGTERM. A background task purges stale rate windows and
//! expired admin sessions on the configured interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wirebridge_config::WirebridgeConfig;
use wirebridge_core::{GatewayStore, PluginAdapter, StorageAdapter, WirebridgeError};
use wirebridge_gateway::{GatewayState, Orchestrator, bind, build_router, start_server};
use wirebridge_storage::SqliteStorage;

use crate::shutdown;

pub async fn run_serve(config: WirebridgeConfig) -> Result<(), WirebridgeError> {
    init_tracing(&config.server.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        model = %config.server.model_name,
        "starting wirebridge"
    );

    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    info!(path = %config.storage.database_path, "storage initialized");

    let store: Arc<dyn GatewayStore> = storage.clone();
    let health: Arc<dyn PluginAdapter> = storage.clone();

    let orchestrator = Arc::new(Orchestrator::new(store, &config)?);
    let state = GatewayState::from_config(orchestrator.clone(), &config, Some(health));
    if state.admin.is_none() {
        info!("admin API disabled (server.admin_password not set)");
    }
    let router = build_router(state);

    let cancel = shutdown::install_signal_handler();

    let purge = tokio::spawn(purge_loop(
        orchestrator.clone(),
        Duration::from_secs(config.rate_limit.purge_interval_secs.max(1)),
        config.rate_limit.max_age_secs,
        cancel.clone(),
    ));

    let listener = bind(&config.server.host, config.server.port).await?;
    let result = start_server(listener, router, cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = purge.await {
        warn!(error = %e, "purge task ended abnormally");
    }

    if let Err(e) = storage.close().await {
        warn!(error = %e, "storage close failed");
    }
    info!("wirebridge stopped");
    result
}

/// Periodic cleanup of rate windows and admin sessions.
async fn purge_loop(
    orchestrator: Arc<Orchestrator>,
    every: Duration,
    max_age_secs: i64,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    // The first tick fires immediately; skip it so startup stays quiet.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = orchestrator.purge_expired(max_age_secs, Utc::now()).await {
                    warn!(error = %e, "purge of expired records failed");
                }
            }
        }
    }
    debug!("purge task stopped");
}

/// `RUST_LOG` wins; otherwise our crates log at `log_level` and everything
/// else at warn.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wirebridge={log_level},warn")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirebridge_test_utils::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn purge_loop_stops_on_cancel() {
        let config = wirebridge_config::load_and_validate_str("").unwrap();
        let store: Arc<dyn GatewayStore> = Arc::new(MemoryStore::new());
        let orchestrator = Arc::new(Orchestrator::new(store, &config).unwrap());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(purge_loop(
            orchestrator,
            Duration::from_secs(60),
            3600,
            cancel.clone(),
        ));
        tokio::time::advance(Duration::from_secs(125)).await;
        cancel.cancel();
        task.await.unwrap();
    }
}
