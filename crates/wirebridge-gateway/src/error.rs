// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping from [`WirebridgeError`] to HTTP responses.

use axum::Json;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;
use wirebridge_access::RateDecision;
use wirebridge_core::WirebridgeError;

use crate::redact::redact;

/// Error body for every failure except rate limiting.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// 429 body.
#[derive(Debug, Serialize)]
pub struct RateLimitedResponse {
    pub error: String,
    pub retry_after: u64,
}

/// A failed request, with the rate decision when one was taken.
#[derive(Debug)]
pub struct ApiError {
    pub error: WirebridgeError,
    pub rate: Option<RateDecision>,
}

impl ApiError {
    pub fn new(error: WirebridgeError) -> Self {
        Self { error, rate: None }
    }

    pub fn with_rate(mut self, rate: Option<RateDecision>) -> Self {
        self.rate = rate;
        self
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(WirebridgeError::InvalidRequest(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        status_for(&self.error)
    }

    /// Caller-visible message, scrubbed of secrets.
    pub fn message(&self) -> String {
        public_message(&self.error)
    }
}

impl From<WirebridgeError> for ApiError {
    fn from(error: WirebridgeError) -> Self {
        Self::new(error)
    }
}

pub fn status_for(error: &WirebridgeError) -> StatusCode {
    match error {
        WirebridgeError::Auth(_) => StatusCode::UNAUTHORIZED,
        WirebridgeError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        WirebridgeError::NoCredentialAvailable => StatusCode::SERVICE_UNAVAILABLE,
        WirebridgeError::InvalidRequest(_) | WirebridgeError::Attachment { .. } => {
            StatusCode::BAD_REQUEST
        }
        WirebridgeError::NotFound(_) => StatusCode::NOT_FOUND,
        WirebridgeError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Storage and config internals are not echoed to callers.
pub fn public_message(error: &WirebridgeError) -> String {
    match error {
        WirebridgeError::Storage { .. } | WirebridgeError::Config(_) => {
            "Internal server error".to_string()
        }
        other => redact(&other.to_string()),
    }
}

/// `x-ratelimit-*` headers for a decision.
pub fn rate_headers(decision: &RateDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    if let Ok(reset) = HeaderValue::from_str(&decision.reset_at_rfc3339()) {
        headers.insert("x-ratelimit-reset", reset);
    }
    headers
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %redact(&self.error.to_string()), "request failed");
        }
        let headers = self.rate.as_ref().map(rate_headers).unwrap_or_default();

        if let WirebridgeError::RateLimited { retry_after_secs } = self.error {
            let body = RateLimitedResponse {
                error: "Too many requests".to_string(),
                retry_after: retry_after_secs,
            };
            return (status, headers, Json(body)).into_response();
        }
        (status, headers, Json(ErrorResponse { error: self.message() })).into_response()
    }
}

/// 429 for a denied decision.
pub fn rate_limited(decision: RateDecision) -> ApiError {
    ApiError::new(WirebridgeError::RateLimited {
        retry_after_secs: decision.retry_after_secs(Utc::now()),
    })
    .with_rate(Some(decision))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wirebridge_core::{AttachmentStep, AuthFailure};

    #[test]
    fn status_mapping() {
        let cases = [
            (WirebridgeError::Auth(AuthFailure::Expired), 401),
            (WirebridgeError::RateLimited { retry_after_secs: 3 }, 429),
            (WirebridgeError::NoCredentialAvailable, 503),
            (WirebridgeError::attachment(AttachmentStep::Presign, "403"), 400),
            (WirebridgeError::InvalidRequest("bad".into()), 400),
            (WirebridgeError::NotFound("key".into()), 404),
            (WirebridgeError::Conflict("secret".into()), 409),
            (
                WirebridgeError::UpstreamResponseTimeout {
                    duration: Duration::from_secs(1),
                },
                500,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(status_for(&err).as_u16(), code, "{err:?}");
        }
    }

    #[test]
    fn storage_details_stay_private() {
        let err = WirebridgeError::Storage {
            source: "disk I/O error at /var/lib/wirebridge.db".into(),
        };
        assert_eq!(public_message(&err), "Internal server error");
    }

    #[test]
    fn headers_carry_decision() {
        let decision = RateDecision {
            allowed: true,
            limit: 60,
            remaining: 59,
            reset_at: 1_780_000_020,
        };
        let headers = rate_headers(&decision);
        assert_eq!(headers["x-ratelimit-limit"], "60");
        assert_eq!(headers["x-ratelimit-remaining"], "59");
        assert!(headers["x-ratelimit-reset"].to_str().unwrap().starts_with("2026-"));
    }
}
