// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-window rate limiting.
//!
//! `check` and `record` are separate calls. Two concurrent requests can both
//! pass `check` on the last free slot; the overshoot is bounded by the number
//! of in-flight requests for one identity.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use wirebridge_config::model::RateLimitConfig;
use wirebridge_core::{RateKind, RateLimitStore, WirebridgeError};

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: i64,
    /// Slots left. From `check`, before this request is recorded; after
    /// [`RateDecision::recorded`], what the caller has left.
    pub remaining: i64,
    /// Unix seconds at which the current window closes.
    pub reset_at: i64,
}

impl RateDecision {
    /// The same decision once the window count has reached `count`.
    pub fn recorded(self, count: i64) -> Self {
        Self {
            remaining: (self.limit - count).max(0),
            ..self
        }
    }

    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        (self.reset_at - now.timestamp()).max(0) as u64
    }

    pub fn reset_at_rfc3339(&self) -> String {
        DateTime::from_timestamp(self.reset_at, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default()
    }
}

/// Start of the window containing `unix_secs`.
pub fn window_start(unix_secs: i64, window_secs: i64) -> i64 {
    unix_secs.div_euclid(window_secs) * window_secs
}

pub struct RateLimiter<S: ?Sized> {
    store: Arc<S>,
    limit: i64,
    window_secs: i64,
}

impl<S: RateLimitStore + ?Sized> RateLimiter<S> {
    pub fn new(store: Arc<S>, limit: i64, window_secs: i64) -> Self {
        Self {
            store,
            limit,
            window_secs: window_secs.max(1),
        }
    }

    pub fn from_config(store: Arc<S>, config: &RateLimitConfig) -> Self {
        Self::new(store, config.limit, config.window_secs)
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub async fn check(
        &self,
        identity: &str,
        kind: RateKind,
    ) -> Result<RateDecision, WirebridgeError> {
        self.check_at(identity, kind, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        identity: &str,
        kind: RateKind,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, WirebridgeError> {
        let start = window_start(now.timestamp(), self.window_secs);
        let count = self.store.window_count(identity, kind, start).await?;
        let decision = RateDecision {
            allowed: count < self.limit,
            limit: self.limit,
            remaining: (self.limit - count).max(0),
            reset_at: start + self.window_secs,
        };
        if !decision.allowed {
            debug!(%kind, count, limit = self.limit, "rate window exhausted");
        }
        Ok(decision)
    }

    pub async fn record(&self, identity: &str, kind: RateKind) -> Result<i64, WirebridgeError> {
        self.record_at(identity, kind, Utc::now()).await
    }

    pub async fn record_at(
        &self,
        identity: &str,
        kind: RateKind,
        now: DateTime<Utc>,
    ) -> Result<i64, WirebridgeError> {
        let start = window_start(now.timestamp(), self.window_secs);
        self.store.increment_window(identity, kind, start).await
    }

    /// Drop windows that started more than `max_age_secs` before `now`.
    pub async fn purge_older_than(
        &self,
        max_age_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, WirebridgeError> {
        self.store
            .purge_windows_before(now.timestamp() - max_age_secs)
            .await
    }
}
