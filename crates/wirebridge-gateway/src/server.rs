// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post, put},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use wirebridge_config::WirebridgeConfig;
use wirebridge_core::{PluginAdapter, WirebridgeError};

use crate::admin;
use crate::auth::{admin_auth, caller_auth};
use crate::error::ErrorResponse;
use crate::handlers;
use crate::orchestrator::Orchestrator;

/// Floor for the request body limit; inline attachments push it higher.
const MIN_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Health state for the unauthenticated health endpoint.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: Instant,
    /// Storage backend, probed on every health request.
    pub storage: Option<Arc<dyn PluginAdapter>>,
}

/// Admin login settings. Absent when no password is configured.
#[derive(Clone)]
pub struct AdminAuth {
    pub password: String,
    pub session_ttl: Duration,
}

impl std::fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuth")
            .field("password", &"[redacted]")
            .field("session_ttl", &self.session_ttl)
            .finish()
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub orchestrator: Arc<Orchestrator>,
    pub admin: Option<AdminAuth>,
    pub health: HealthState,
    /// Largest accepted request body.
    pub body_limit: usize,
}

impl GatewayState {
    /// Wire state from configuration.
    pub fn from_config(
        orchestrator: Arc<Orchestrator>,
        config: &WirebridgeConfig,
        storage: Option<Arc<dyn PluginAdapter>>,
    ) -> Self {
        let admin = config
            .server
            .admin_password
            .as_ref()
            .filter(|p| !p.is_empty())
            .map(|password| AdminAuth {
                password: password.clone(),
                session_ttl: Duration::from_secs(config.server.admin_session_ttl_secs),
            });
        // base64 inflates inline attachments by a third; allow for it.
        let body_limit = MIN_BODY_LIMIT.max(
            usize::try_from(config.attachments.max_bytes)
                .unwrap_or(usize::MAX / 2)
                .saturating_mul(2),
        );
        Self {
            orchestrator,
            admin,
            health: HealthState {
                start_time: Instant::now(),
                storage,
            },
            body_limit,
        }
    }
}

async fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Not found".to_string(),
        }),
    )
}

/// Build the gateway router.
///
/// - `GET /health`, `GET /v1/health`: public
/// - `GET /models`, `POST /chat/completions`, `POST /responses` (and their
///   `/v1` aliases): caller key required
/// - `/admin/*`: mounted only when an admin password is configured
pub fn build_router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/v1/health", get(handlers::get_health))
        .with_state(state.clone());

    let mut api_routes = Router::new();
    for prefix in ["", "/v1"] {
        api_routes = api_routes
            .route(&format!("{prefix}/models"), get(handlers::get_models))
            .route(
                &format!("{prefix}/chat/completions"),
                post(handlers::post_chat_completions),
            )
            .route(&format!("{prefix}/responses"), post(handlers::post_responses));
    }
    let api_routes = api_routes
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            caller_auth,
        ))
        .with_state(state.clone());

    let mut app = Router::new().merge(public_routes).merge(api_routes);

    if state.admin.is_some() {
        let admin_api = Router::new()
            .route(
                "/admin/api/credentials",
                get(admin::list_credentials).post(admin::create_credential),
            )
            .route(
                "/admin/api/credentials/{id}",
                put(admin::update_credential).delete(admin::delete_credential),
            )
            .route("/admin/api/keys", get(admin::list_keys).post(admin::create_key))
            .route(
                "/admin/api/keys/{id}",
                put(admin::update_key).delete(admin::delete_key),
            )
            .route("/admin/api/logs", get(admin::get_logs))
            .route("/admin/api/stats", get(admin::get_stats))
            .route_layer(axum_middleware::from_fn_with_state(
                state.clone(),
                admin_auth,
            ))
            .with_state(state.clone());
        let admin_session = Router::new()
            .route("/admin/login", post(admin::login))
            .route("/admin/logout", post(admin::logout))
            .with_state(state.clone());
        app = app.merge(admin_session).merge(admin_api);
    }

    app.fallback(not_found)
        .layer(DefaultBodyLimit::max(state.body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind `host:port`.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, WirebridgeError> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .await
        .map_err(|e| WirebridgeError::Internal(format!("failed to bind gateway to {addr}: {e}")))
}

/// Serve `router` until `shutdown` is cancelled. In-flight requests drain
/// before this returns.
pub async fn start_server(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> Result<(), WirebridgeError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "gateway server listening");
    }
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .map_err(|e| WirebridgeError::Internal(format!("gateway server error: {e}")))?;
    tracing::info!("gateway server stopped");
    Ok(())
}
