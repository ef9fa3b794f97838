// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication middleware for the gateway.
//!
//! Two independent schemes:
//! 1. Caller keys (`Authorization: Bearer <secret>`) on the OpenAI-compatible
//!    routes. The validated [`CallerKey`] and the caller's [`ClientMeta`] are
//!    handed to handlers as request extensions.
//! 2. Admin sessions (`session` cookie) on `/admin/api`, checked against the
//!    session store on every request.

use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;

use crate::error::{ApiError, ErrorResponse};
use crate::orchestrator::{ClientMeta, LogDraft};
use crate::server::GatewayState;

/// Name of the admin session cookie.
pub const SESSION_COOKIE: &str = "session";

/// The bearer token, if the header is present and well-formed.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
}

/// Caller address: first `x-forwarded-for` hop, then `x-real-ip`, then the
/// socket peer.
pub fn client_meta(request: &Request) -> ClientMeta {
    let headers = request.headers();
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let ip = header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip").map(str::to_string))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });
    ClientMeta {
        ip,
        user_agent: header("user-agent").map(str::to_string),
    }
}

/// Validates the caller key. Rejections are written to the request log.
pub async fn caller_auth(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Response {
    let client = client_meta(&request);
    let orchestrator = state.orchestrator.clone();
    match orchestrator.authenticate(bearer_token(request.headers())).await {
        Ok(key) => {
            request.extensions_mut().insert(key);
            request.extensions_mut().insert(client);
            next.run(request).await
        }
        Err(err) => {
            let err = ApiError::new(err);
            let draft = LogDraft::new(request.uri().path(), request.method().as_str(), &client);
            orchestrator
                .record(draft.finish(err.status().as_u16(), Some(&err.message())))
                .await;
            err.into_response()
        }
    }
}

/// Rejects admin API calls without a live session cookie.
pub async fn admin_auth(
    State(state): State<GatewayState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let token = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let valid = match token {
        Some(token) if !token.is_empty() => state
            .orchestrator
            .store()
            .admin_session_valid(&token, Utc::now())
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "admin session lookup failed");
                false
            }),
        _ => false,
    };
    if !valid {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Unauthorized".to_string(),
            }),
        )
            .into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn bearer_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", "Bearer ck-abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("ck-abc"));
        headers.insert("authorization", "Basic Zm9v".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn forwarded_for_wins_over_peer() {
        let mut request = Request::builder()
            .header("x-forwarded-for", "198.51.100.4, 10.0.0.1")
            .header("user-agent", "curl/8")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000))));
        let meta = client_meta(&request);
        assert_eq!(meta.ip.as_deref(), Some("198.51.100.4"));
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8"));
    }

    #[test]
    fn peer_address_is_the_fallback() {
        let mut request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_meta(&request).ip, None);
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 9000))));
        assert_eq!(client_meta(&request).ip.as_deref(), Some("192.0.2.1"));
    }
}
