// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-request orchestration.
//!
//! Every bridged call runs the same admission sequence: caller key, rate
//! windows, watermark, credential, attachments, usage increments. Only then is
//! a backend session opened. Each outcome, early rejections included, ends in
//! exactly one request log entry.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use wirebridge_access::watermark::strip_zero_width;
use wirebridge_access::{
    CredentialPool, KeyRegistry, RateDecision, RateLimiter, WatermarkFailure, WatermarkVerifier,
};
use wirebridge_config::WirebridgeConfig;
use wirebridge_core::{
    AttachmentDescriptor, AuthFailure, CallerKey, GatewayStore, RateKind, RequestLogEntry,
    WirebridgeError, format_timestamp,
};
use wirebridge_upstream::{AttachmentPipeline, Bridge};

use crate::openai::Turn;
use crate::redact::redact;

/// Longest prompt excerpt kept in the request log.
pub const SUMMARY_CHARS: usize = 200;

/// Who is calling, as far as the transport can tell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// First `SUMMARY_CHARS` characters of `text`.
pub fn summarize(text: &str) -> String {
    text.chars().take(SUMMARY_CHARS).collect()
}

/// A request log entry under construction.
#[derive(Debug, Clone)]
pub struct LogDraft {
    entry: RequestLogEntry,
    started: Instant,
}

impl LogDraft {
    pub fn new(endpoint: &str, method: &str, client: &ClientMeta) -> Self {
        Self {
            entry: RequestLogEntry {
                endpoint: endpoint.to_string(),
                method: method.to_string(),
                client_ip: client.ip.clone(),
                user_agent: client.user_agent.clone(),
                ..RequestLogEntry::default()
            },
            started: Instant::now(),
        }
    }

    pub fn caller(&mut self, key_id: &str) {
        self.entry.caller_key_id = Some(key_id.to_string());
    }

    pub fn credential(&mut self, credential_id: &str) {
        self.entry.credential_id = Some(credential_id.to_string());
    }

    pub fn prompts(&mut self, turn: &Turn) {
        self.entry.system_prompt = turn
            .system
            .as_deref()
            .map(|s| summarize(&strip_zero_width(s)));
        self.entry.user_prompt = turn.last_user.as_deref().map(summarize);
    }

    /// Attach a message to an otherwise successful outcome.
    pub fn note(&mut self, message: &str) {
        self.entry.error_message = Some(redact(message));
    }

    /// Stamp latency and outcome. An explicit `error` replaces any note.
    pub fn finish(mut self, status: u16, error: Option<&str>) -> RequestLogEntry {
        self.entry.status_code = status;
        self.entry.latency_ms = self.started.elapsed().as_millis() as i64;
        if let Some(error) = error {
            self.entry.error_message = Some(redact(error));
        }
        self.entry.created_at = format_timestamp(Utc::now());
        self.entry
    }
}

/// Ready to open a backend session.
pub struct Dispatch {
    pub credential_id: String,
    pub token: String,
    pub prompt: String,
    pub attachments: Vec<AttachmentDescriptor>,
}

/// Outcome of the admission sequence past rate limiting.
pub enum Prepared {
    /// The watermark did not verify. Answer with the decoy, never say why.
    Decoy { reason: WatermarkFailure },
    Dispatch(Dispatch),
}

pub struct Orchestrator {
    store: Arc<dyn GatewayStore>,
    keys: KeyRegistry<dyn GatewayStore>,
    limiter: Option<RateLimiter<dyn GatewayStore>>,
    pool: CredentialPool<dyn GatewayStore>,
    watermark: Option<WatermarkVerifier>,
    decoy_reply: String,
    attachments: AttachmentPipeline,
    bridge: Bridge,
    model_name: String,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn GatewayStore>,
        config: &WirebridgeConfig,
    ) -> Result<Self, WirebridgeError> {
        let limiter = config
            .rate_limit
            .enabled
            .then(|| RateLimiter::from_config(store.clone(), &config.rate_limit));
        let watermark = config
            .watermark
            .enabled
            .then(|| WatermarkVerifier::from_config(&config.watermark));
        Ok(Self {
            keys: KeyRegistry::new(store.clone()),
            pool: CredentialPool::from_config(store.clone(), &config.pool),
            limiter,
            watermark,
            decoy_reply: config.watermark.decoy_reply.clone(),
            attachments: AttachmentPipeline::new(&config.backend, &config.attachments)?,
            bridge: Bridge::from_config(&config.backend),
            model_name: config.server.model_name.clone(),
            store,
        })
    }

    pub fn store(&self) -> &Arc<dyn GatewayStore> {
        &self.store
    }

    pub fn keys(&self) -> &KeyRegistry<dyn GatewayStore> {
        &self.keys
    }

    pub fn pool(&self) -> &CredentialPool<dyn GatewayStore> {
        &self.pool
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn decoy_reply(&self) -> &str {
        &self.decoy_reply
    }

    /// Validate a bearer secret. Usage is not touched.
    pub async fn authenticate(&self, bearer: Option<&str>) -> Result<CallerKey, WirebridgeError> {
        let secret = bearer
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(WirebridgeError::Auth(AuthFailure::Missing))?;
        self.keys.validate(secret).await
    }

    /// Check the caller's key window and, when known, its IP window.
    ///
    /// Returns the first denial, or the tightest allowing decision after
    /// recording the request against every window, with `remaining` counting
    /// this request. `None` when rate limiting is disabled.
    pub async fn check_rate(
        &self,
        key: &CallerKey,
        client: &ClientMeta,
    ) -> Result<Option<RateDecision>, WirebridgeError> {
        let Some(limiter) = &self.limiter else {
            return Ok(None);
        };
        let now = Utc::now();
        let mut identities = vec![(key.id.as_str(), RateKind::ApiKey)];
        if let Some(ip) = client.ip.as_deref() {
            identities.push((ip, RateKind::Ip));
        }

        let mut allowed = Vec::with_capacity(identities.len());
        for (identity, kind) in &identities {
            let decision = limiter.check_at(identity, *kind, now).await?;
            if !decision.allowed {
                info!(key_id = %key.id, %kind, "rate limited");
                return Ok(Some(decision));
            }
            allowed.push(decision);
        }

        let mut tightest: Option<RateDecision> = None;
        for ((identity, kind), decision) in identities.into_iter().zip(allowed) {
            let count = limiter.record_at(identity, kind, now).await?;
            let decision = decision.recorded(count);
            tightest = match tightest {
                Some(t) if t.remaining <= decision.remaining => Some(t),
                _ => Some(decision),
            };
        }
        Ok(tightest)
    }

    /// Watermark, credential, attachments, usage increments.
    ///
    /// Usage is counted before the backend is contacted, so a backend failure
    /// still consumes quota.
    pub async fn prepare(&self, key: &CallerKey, turn: &Turn) -> Result<Prepared, WirebridgeError> {
        if let Some(verifier) = &self.watermark {
            let system = turn.system.as_deref().unwrap_or_default();
            if let Err(reason) = verifier.verify(system) {
                warn!(key_id = %key.id, %reason, "watermark rejected, serving decoy");
                self.keys.increment_usage(&key.id).await?;
                return Ok(Prepared::Decoy { reason });
            }
        }

        let credential = self
            .pool
            .select_best_credential()
            .await?
            .ok_or(WirebridgeError::NoCredentialAvailable)?;

        let attachments = self
            .attachments
            .resolve_all(&credential.token, &turn.attachments)
            .await?;
        let prompt = turn.prompt(&attachments);

        let (credential_usage, key_usage) = tokio::join!(
            self.pool.increment_usage(&credential.id),
            self.keys.increment_usage(&key.id),
        );
        credential_usage?;
        key_usage?;

        debug!(
            key_id = %key.id,
            credential_id = %credential.id,
            attachments = attachments.len(),
            prompt_chars = prompt.chars().count(),
            "dispatching to backend"
        );
        Ok(Prepared::Dispatch(Dispatch {
            credential_id: credential.id,
            token: credential.token,
            prompt,
            attachments,
        }))
    }

    /// Append to the request log. Failures are logged, not returned.
    pub async fn record(&self, entry: RequestLogEntry) {
        if let Err(e) = self.store.append_log(&entry).await {
            warn!(error = %e, endpoint = %entry.endpoint, "failed to write request log");
        }
    }

    /// Drop stale rate windows and expired admin sessions.
    pub async fn purge_expired(
        &self,
        max_age_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<(u64, u64), WirebridgeError> {
        let windows = self
            .store
            .purge_windows_before(now.timestamp() - max_age_secs)
            .await?;
        let sessions = self.store.purge_expired_admin_sessions(now).await?;
        if windows > 0 || sessions > 0 {
            debug!(windows, sessions, "purged expired records");
        }
        Ok((windows, sessions))
    }
}

/// A log entry owed by a streaming response.
///
/// Written when the stream reaches its terminal event; if the stream is
/// dropped first (the client went away), written on drop instead.
pub struct PendingLog {
    orchestrator: Arc<Orchestrator>,
    draft: Option<LogDraft>,
}

/// Status recorded when the caller disconnects mid-stream.
pub const CLIENT_CLOSED: u16 = 499;

impl PendingLog {
    pub fn new(orchestrator: Arc<Orchestrator>, draft: LogDraft) -> Self {
        Self {
            orchestrator,
            draft: Some(draft),
        }
    }

    /// Write the entry now and wait for the store.
    pub async fn complete(mut self, status: u16, error: Option<&str>) {
        if let Some(draft) = self.draft.take() {
            self.orchestrator.record(draft.finish(status, error)).await;
        }
    }

    /// Write the entry in the background.
    pub fn finish(&mut self, status: u16, error: Option<&str>) {
        let Some(draft) = self.draft.take() else {
            return;
        };
        let entry = draft.finish(status, error);
        let orchestrator = self.orchestrator.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { orchestrator.record(entry).await });
        }
    }
}

impl Drop for PendingLog {
    fn drop(&mut self) {
        self.finish(CLIENT_CLOSED, Some("client disconnected before completion"));
    }
}
