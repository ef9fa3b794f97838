// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the OpenAI-compatible surface.
//!
//! Handles GET /models, POST /chat/completions, POST /responses, GET /health.

use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use wirebridge_access::RateDecision;
use wirebridge_core::{CallerKey, HealthStatus};
use wirebridge_upstream::ids::{rand_hex, rand_id};

use crate::error::{ApiError, rate_headers, rate_limited};
use crate::openai::{
    ChatRequest, ResponseEnvelope, ResponsesRequest, Turn, chat_completion, models_list,
};
use crate::orchestrator::{ClientMeta, LogDraft, Orchestrator, PendingLog, Prepared};
use crate::server::GatewayState;
use crate::sse::{self, ChatMeta};

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub storage: String,
}

/// GET /health
///
/// 503 when the storage backend reports itself unhealthy.
pub async fn get_health(State(state): State<GatewayState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, storage) = match &state.health.storage {
        None => (StatusCode::OK, "ok", "not configured".to_string()),
        Some(adapter) => match adapter.health_check().await {
            Ok(HealthStatus::Healthy) => (StatusCode::OK, "ok", "ok".to_string()),
            Ok(HealthStatus::Degraded(why)) => {
                (StatusCode::OK, "degraded", format!("degraded: {why}"))
            }
            Ok(HealthStatus::Unhealthy(why)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unhealthy",
                format!("unhealthy: {why}"),
            ),
            Err(e) => {
                tracing::warn!(error = %e, "storage health check failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "unhealthy",
                    "unhealthy: health check failed".to_string(),
                )
            }
        },
    };
    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: state.health.start_time.elapsed().as_secs(),
            storage,
        }),
    )
}

/// GET /models
pub async fn get_models(State(state): State<GatewayState>) -> Json<Value> {
    Json(models_list(state.orchestrator.model_name()))
}

/// Log `err` against `draft` and render it.
async fn reject(orchestrator: &Orchestrator, draft: LogDraft, err: ApiError) -> Response {
    orchestrator
        .record(draft.finish(err.status().as_u16(), Some(&err.message())))
        .await;
    err.into_response()
}

fn with_rate(mut response: Response, rate: Option<&RateDecision>) -> Response {
    if let Some(decision) = rate {
        response.headers_mut().extend(rate_headers(decision));
    }
    response
}

/// Caller identity and rate verdict, shared by the bridged endpoints.
async fn admit(
    orchestrator: &Orchestrator,
    key: &CallerKey,
    client: &ClientMeta,
    endpoint: &str,
) -> Result<(LogDraft, Option<RateDecision>), Response> {
    let mut draft = LogDraft::new(endpoint, "POST", client);
    draft.caller(&key.id);
    match orchestrator.check_rate(key, client).await {
        Ok(Some(decision)) if !decision.allowed => {
            Err(reject(orchestrator, draft, rate_limited(decision)).await)
        }
        Ok(rate) => Ok((draft, rate)),
        Err(e) => Err(reject(orchestrator, draft, ApiError::new(e)).await),
    }
}

/// Response shape of a bridged endpoint.
enum Reply {
    Chat(ChatMeta),
    Responses(ResponseEnvelope),
}

impl Reply {
    fn body(&self, text: &str) -> Value {
        match self {
            Reply::Chat(m) => chat_completion(&m.id, m.created, &m.model, text),
            Reply::Responses(envelope) => envelope.object("completed", Some(text)),
        }
    }

    fn stream<S>(self, events: S, log: PendingLog, cancel: CancellationToken) -> Response
    where
        S: futures::Stream<Item = wirebridge_upstream::BridgeEvent> + Send + 'static,
    {
        match self {
            Reply::Chat(meta) => sse::chat_stream(events, meta, log, cancel).into_response(),
            Reply::Responses(envelope) => {
                sse::responses_stream(events, envelope, log, cancel).into_response()
            }
        }
    }
}

/// Everything after parsing: admission, dispatch, reply.
async fn bridge_call(
    orchestrator: Arc<Orchestrator>,
    key: &CallerKey,
    mut draft: LogDraft,
    rate: Option<RateDecision>,
    turn: Turn,
    stream: bool,
    reply: Reply,
) -> Response {
    draft.prompts(&turn);
    let prepared = match orchestrator.prepare(key, &turn).await {
        Ok(p) => p,
        Err(e) => {
            let err = ApiError::new(e).with_rate(rate);
            return reject(&orchestrator, draft, err).await;
        }
    };

    let response = match prepared {
        Prepared::Decoy { reason } => {
            draft.note(&format!("watermark rejected: {reason}"));
            let log = PendingLog::new(orchestrator.clone(), draft);
            let decoy = orchestrator.decoy_reply();
            if stream {
                reply.stream(sse::canned_reply(decoy.to_string()), log, CancellationToken::new())
            } else {
                log.complete(200, None).await;
                Json(reply.body(decoy)).into_response()
            }
        }
        Prepared::Dispatch(dispatch) => {
            draft.credential(&dispatch.credential_id);
            let log = PendingLog::new(orchestrator.clone(), draft);
            let cancel = CancellationToken::new();
            if stream {
                let rx = orchestrator.bridge().stream(
                    dispatch.token,
                    dispatch.prompt,
                    dispatch.attachments,
                    cancel.clone(),
                );
                reply.stream(sse::receiver_stream(rx), log, cancel)
            } else {
                // Dropped with this future when the caller disconnects.
                let _guard = cancel.clone().drop_guard();
                let outcome = orchestrator
                    .bridge()
                    .complete(&dispatch.token, &dispatch.prompt, &dispatch.attachments, &cancel)
                    .await;
                match outcome {
                    Ok(text) => {
                        log.complete(200, None).await;
                        Json(reply.body(&text)).into_response()
                    }
                    Err(e) => {
                        let err = ApiError::new(e);
                        log.complete(err.status().as_u16(), Some(&err.message()))
                            .await;
                        err.into_response()
                    }
                }
            }
        }
    };
    with_rate(response, rate.as_ref())
}

/// POST /chat/completions
pub async fn post_chat_completions(
    State(state): State<GatewayState>,
    Extension(key): Extension<CallerKey>,
    Extension(client): Extension<ClientMeta>,
    uri: Uri,
    body: Bytes,
) -> Response {
    let orchestrator = state.orchestrator.clone();
    let (draft, rate) = match admit(&orchestrator, &key, &client, uri.path()).await {
        Ok(admitted) => admitted,
        Err(response) => return response,
    };
    let call = match ChatRequest::parse(&body, orchestrator.model_name()) {
        Ok(call) => call,
        Err(err) => return reject(&orchestrator, draft, err.with_rate(rate)).await,
    };
    let reply = Reply::Chat(ChatMeta {
        id: format!("chatcmpl-{}", rand_id(29)),
        created: Utc::now().timestamp(),
        model: call.model,
    });
    bridge_call(orchestrator, &key, draft, rate, call.turn, call.stream, reply).await
}

/// POST /responses
pub async fn post_responses(
    State(state): State<GatewayState>,
    Extension(key): Extension<CallerKey>,
    Extension(client): Extension<ClientMeta>,
    uri: Uri,
    body: Bytes,
) -> Response {
    let orchestrator = state.orchestrator.clone();
    let (draft, rate) = match admit(&orchestrator, &key, &client, uri.path()).await {
        Ok(admitted) => admitted,
        Err(response) => return response,
    };
    let call = match ResponsesRequest::parse(&body, orchestrator.model_name()) {
        Ok(call) => call,
        Err(err) => return reject(&orchestrator, draft, err.with_rate(rate)).await,
    };
    let reply = Reply::Responses(ResponseEnvelope {
        id: format!("resp_{}", rand_hex(16)),
        message_id: format!("msg_{}", rand_hex(16)),
        created_at: Utc::now().timestamp(),
        model: call.model,
        passthrough: call.passthrough,
    });
    bridge_call(orchestrator, &key, draft, rate, call.turn, call.stream, reply).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            uptime_secs: 42,
            storage: "ok".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"uptime_secs\":42"));
    }

    #[test]
    fn rate_headers_are_appended() {
        let decision = RateDecision {
            allowed: true,
            limit: 5,
            remaining: 4,
            reset_at: 1_780_000_000,
        };
        let response = with_rate(StatusCode::OK.into_response(), Some(&decision));
        assert_eq!(response.headers()["x-ratelimit-remaining"], "4");
        let bare = with_rate(StatusCode::OK.into_response(), None);
        assert!(bare.headers().get("x-ratelimit-limit").is_none());
    }
}
