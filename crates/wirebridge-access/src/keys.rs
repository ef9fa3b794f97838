// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caller key registry: issuance, validation, and metering.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::debug;
use wirebridge_core::{AuthFailure, CallerKey, CallerKeyStore, WirebridgeError, format_timestamp};

pub const SECRET_PREFIX: &str = "ck";
const SECRET_LEN: usize = 48;
const ISSUE_ATTEMPTS: usize = 3;

/// A new secret: `ck-` followed by 48 alphanumerics.
pub fn generate_secret() -> String {
    let body: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect();
    format!("{SECRET_PREFIX}-{body}")
}

/// First and last four characters around `****`; short secrets are fully hidden.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}

pub struct KeyRegistry<S: ?Sized> {
    store: Arc<S>,
}

impl<S: CallerKeyStore + ?Sized> KeyRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn validate(&self, secret: &str) -> Result<CallerKey, WirebridgeError> {
        self.validate_at(secret, Utc::now()).await
    }

    /// Checks, in order: existence, active flag, expiry, quota.
    pub async fn validate_at(
        &self,
        secret: &str,
        now: DateTime<Utc>,
    ) -> Result<CallerKey, WirebridgeError> {
        let key = self
            .store
            .get_key_by_secret(secret)
            .await?
            .ok_or(WirebridgeError::Auth(AuthFailure::Invalid))?;

        let failure = if !key.active {
            Some(AuthFailure::Disabled)
        } else if key.expires_at.is_some_and(|exp| exp <= now) {
            Some(AuthFailure::Expired)
        } else if !key.is_unlimited() && key.used_count >= key.quota {
            Some(AuthFailure::QuotaExceeded)
        } else {
            None
        };

        match failure {
            Some(reason) => {
                debug!(key_id = %key.id, %reason, "caller key rejected");
                Err(WirebridgeError::Auth(reason))
            }
            None => Ok(key),
        }
    }

    pub async fn increment_usage(&self, id: &str) -> Result<(), WirebridgeError> {
        self.store.increment_key_usage(id).await
    }

    /// Create and persist a key with a fresh secret. The returned record is the
    /// only place the full secret is ever exposed.
    pub async fn issue(
        &self,
        name: &str,
        quota: Option<i64>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<CallerKey, WirebridgeError> {
        let now = format_timestamp(Utc::now());
        let mut last_err = None;
        for _ in 0..ISSUE_ATTEMPTS {
            let key = CallerKey {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                secret: generate_secret(),
                quota: quota.unwrap_or(wirebridge_core::types::UNLIMITED_QUOTA),
                used_count: 0,
                active: true,
                expires_at,
                created_at: now.clone(),
                updated_at: now.clone(),
            };
            match self.store.insert_key(&key).await {
                Ok(()) => return Ok(key),
                Err(e @ WirebridgeError::Conflict(_)) => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| WirebridgeError::Internal("key issuance failed".into())))
    }
}
