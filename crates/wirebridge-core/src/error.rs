// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Wirebridge gateway.

use std::time::Duration;

use thiserror::Error;

/// Why a caller key was refused.
///
/// Variants are checked in declaration order after `Missing`: a key that is
/// both expired and over quota reports `Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No bearer token on the request.
    Missing,
    /// The secret does not match any caller key.
    Invalid,
    /// The key exists but was switched off by an operator.
    Disabled,
    /// The key's absolute expiry has passed.
    Expired,
    /// The key has consumed its quota.
    QuotaExceeded,
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            AuthFailure::Missing => "Missing API key",
            AuthFailure::Invalid => "Invalid API key",
            AuthFailure::Disabled => "API key is disabled",
            AuthFailure::Expired => "API key has expired",
            AuthFailure::QuotaExceeded => "API key usage limit exceeded",
        };
        f.write_str(msg)
    }
}

/// The attachment pipeline step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AttachmentStep {
    Decode,
    Download,
    Presign,
    Transfer,
    Complete,
}

/// The primary error type used across all Wirebridge crates.
#[derive(Debug, Error)]
pub enum WirebridgeError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Caller key rejected.
    #[error("{0}")]
    Auth(AuthFailure),

    /// Fixed-window limit reached for the caller's identity.
    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },

    /// Every backend credential is inactive, exhausted, or expired.
    #[error("No available backend credential")]
    NoCredentialAvailable,

    /// Malformed or unsupported caller request.
    #[error("{0}")]
    InvalidRequest(String),

    /// A record addressed by id does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness constraint would be violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An attachment could not be materialized on the backend.
    #[error("attachment {step} failed: {message}")]
    Attachment {
        step: AttachmentStep,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backend never confirmed the realtime handshake in time.
    #[error("upstream connect timed out after {duration:?}")]
    UpstreamConnectTimeout { duration: Duration },

    /// The realtime connection closed before the terminal status arrived.
    #[error("upstream connection lost: {message}")]
    UpstreamConnectionLost {
        message: String,
        /// Whether any delta had been received before the loss.
        after_delta: bool,
    },

    /// The backend did not finish a response within the full-response budget.
    #[error("upstream response timed out after {duration:?}")]
    UpstreamResponseTimeout { duration: Duration },

    /// The backend sent a frame that violates the wire protocol.
    #[error("upstream protocol error: {message}")]
    UpstreamProtocol { message: String },

    /// Socket-level failure talking to the backend.
    #[error("upstream transport error: {message}")]
    UpstreamTransport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WirebridgeError {
    /// Whether an aggregate bridge call may be attempted again after this error.
    ///
    /// Only failures that happen before any response text was produced qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            WirebridgeError::UpstreamConnectTimeout { .. }
            | WirebridgeError::UpstreamTransport { .. } => true,
            WirebridgeError::UpstreamConnectionLost { after_delta, .. } => !after_delta,
            _ => false,
        }
    }

    /// Whether this error originated on the backend side of the bridge.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            WirebridgeError::UpstreamConnectTimeout { .. }
                | WirebridgeError::UpstreamConnectionLost { .. }
                | WirebridgeError::UpstreamResponseTimeout { .. }
                | WirebridgeError::UpstreamProtocol { .. }
                | WirebridgeError::UpstreamTransport { .. }
        )
    }

    /// Convenience constructor for attachment failures without a source.
    pub fn attachment(step: AttachmentStep, message: impl Into<String>) -> Self {
        WirebridgeError::Attachment {
            step,
            message: message.into(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_messages() {
        assert_eq!(AuthFailure::Invalid.to_string(), "Invalid API key");
        assert_eq!(
            WirebridgeError::Auth(AuthFailure::QuotaExceeded).to_string(),
            "API key usage limit exceeded"
        );
    }

    #[test]
    fn retryable_classification() {
        assert!(
            WirebridgeError::UpstreamConnectTimeout {
                duration: Duration::from_secs(15)
            }
            .is_retryable()
        );
        assert!(
            WirebridgeError::UpstreamConnectionLost {
                message: "eof".into(),
                after_delta: false
            }
            .is_retryable()
        );
        assert!(
            !WirebridgeError::UpstreamConnectionLost {
                message: "eof".into(),
                after_delta: true
            }
            .is_retryable()
        );
        assert!(
            !WirebridgeError::UpstreamResponseTimeout {
                duration: Duration::from_secs(120)
            }
            .is_retryable()
        );
        assert!(!WirebridgeError::NoCredentialAvailable.is_retryable());
    }

    #[test]
    fn attachment_error_names_step() {
        let err = WirebridgeError::attachment(AttachmentStep::Presign, "HTTP 500");
        assert_eq!(err.to_string(), "attachment presign failed: HTTP 500");
    }
}
