// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON admin API: login sessions, credential and caller key management,
//! request log inspection.
//!
//! Mounted only when `server.admin_password` is set. Everything under
//! `/admin/api` sits behind [`crate::auth::admin_auth`].

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use wirebridge_access::{mask_secret, new_credential};
use wirebridge_core::{
    BackendCredential, CallerKey, LogStats, RequestLogEntry, StatsPeriod, WirebridgeError,
    format_timestamp,
};
use wirebridge_upstream::ids::rand_id;

use crate::auth::SESSION_COOKIE;
use crate::error::ApiError;
use crate::server::GatewayState;

const SESSION_TOKEN_LEN: usize = 64;
const DEFAULT_LABEL: &str = "default";
const DEFAULT_LOG_LIMIT: usize = 100;
const MAX_LOG_LIMIT: usize = 1000;

type AdminResult<T> = Result<T, ApiError>;

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> AdminResult<T> {
    serde_json::from_slice(body).map_err(|_| ApiError::invalid("Invalid request body"))
}

/// Distinguishes an absent field from an explicit `null`.
fn present<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(de).map(Some)
}

/// RFC 3339, or a bare date taken as midnight UTC.
pub fn parse_expiry(raw: &str) -> AdminResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ApiError::invalid("Invalid expires_at date format"))
}

fn success() -> Json<Value> {
    Json(json!({ "success": true }))
}

// --- sessions ---

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: String,
}

fn session_cookie(value: &str, max_age_secs: u64) -> Option<HeaderValue> {
    let cookie = if value.is_empty() {
        format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0")
    } else {
        format!("{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Strict; Max-Age={max_age_secs}")
    };
    HeaderValue::from_str(&cookie).ok()
}

/// POST /admin/login
pub async fn login(State(state): State<GatewayState>, body: Bytes) -> Response {
    let Some(admin) = &state.admin else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let request: LoginRequest = match parse_json(&body) {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };
    if request.password != admin.password {
        tracing::warn!("admin login rejected");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid password" })),
        )
            .into_response();
    }

    let token = rand_id(SESSION_TOKEN_LEN);
    let ttl = admin.session_ttl;
    let expires_at = Utc::now() + chrono::Duration::seconds(ttl.as_secs() as i64);
    if let Err(e) = state
        .orchestrator
        .store()
        .create_admin_session(&token, expires_at)
        .await
    {
        return ApiError::new(e).into_response();
    }
    tracing::info!("admin session created");

    let mut response = success().into_response();
    if let Some(cookie) = session_cookie(&token, ttl.as_secs()) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

/// POST /admin/logout
pub async fn logout(State(state): State<GatewayState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE)
        && !cookie.value().is_empty()
        && let Err(e) = state
            .orchestrator
            .store()
            .delete_admin_session(cookie.value())
            .await
    {
        tracing::warn!(error = %e, "failed to delete admin session");
    }
    let mut response = success().into_response();
    if let Some(cookie) = session_cookie("", 0) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

// --- credentials ---

/// A credential as listed: token masked.
#[derive(Debug, Serialize)]
pub struct CredentialView {
    pub id: String,
    pub label: String,
    pub token: String,
    pub daily_quota: i64,
    pub used_count: i64,
    pub active: bool,
    pub last_reset_date: Option<NaiveDate>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<BackendCredential> for CredentialView {
    fn from(c: BackendCredential) -> Self {
        Self {
            token: mask_secret(&c.token),
            id: c.id,
            label: c.label,
            daily_quota: c.daily_quota,
            used_count: c.used_count,
            active: c.active,
            last_reset_date: c.last_reset_date,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Deserialize)]
pub struct CreateCredential {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub daily_quota: Option<i64>,
}

#[derive(Deserialize)]
pub struct UpdateCredential {
    pub label: Option<String>,
    pub token: Option<String>,
    pub daily_quota: Option<i64>,
    pub used_count: Option<i64>,
    pub active: Option<bool>,
}

/// GET /admin/api/credentials
pub async fn list_credentials(
    State(state): State<GatewayState>,
) -> AdminResult<Json<Vec<CredentialView>>> {
    let credentials = state.orchestrator.store().list_credentials().await?;
    Ok(Json(credentials.into_iter().map(CredentialView::from).collect()))
}

/// POST /admin/api/credentials
pub async fn create_credential(
    State(state): State<GatewayState>,
    body: Bytes,
) -> AdminResult<(StatusCode, Json<CredentialView>)> {
    let request: CreateCredential = parse_json(&body)?;
    let token = request
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::invalid("token is required"))?;
    let label = request
        .label
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LABEL.to_string());
    let credential = new_credential(&label, token.trim(), request.daily_quota);
    state
        .orchestrator
        .store()
        .insert_credential(&credential)
        .await?;
    tracing::info!(credential_id = %credential.id, %label, "credential added");
    Ok((StatusCode::CREATED, Json(credential.into())))
}

/// PUT /admin/api/credentials/{id}
pub async fn update_credential(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    body: Bytes,
) -> AdminResult<Json<CredentialView>> {
    let store = state.orchestrator.store();
    let mut credential = store
        .get_credential(&id)
        .await?
        .ok_or_else(|| WirebridgeError::NotFound("Credential".into()))?;
    let request: UpdateCredential = parse_json(&body)?;
    if let Some(label) = request.label {
        credential.label = label;
    }
    if let Some(token) = request.token.filter(|t| !t.trim().is_empty()) {
        credential.token = token.trim().to_string();
    }
    if let Some(quota) = request.daily_quota {
        credential.daily_quota = quota;
    }
    if let Some(used) = request.used_count {
        credential.used_count = used;
    }
    if let Some(active) = request.active {
        credential.active = active;
    }
    credential.updated_at = format_timestamp(Utc::now());
    if !store.update_credential(&credential).await? {
        return Err(WirebridgeError::NotFound("Credential".into()).into());
    }
    Ok(Json(credential.into()))
}

/// DELETE /admin/api/credentials/{id}
pub async fn delete_credential(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> AdminResult<Json<Value>> {
    if !state.orchestrator.store().delete_credential(&id).await? {
        return Err(WirebridgeError::NotFound("Credential".into()).into());
    }
    tracing::info!(credential_id = %id, "credential deleted");
    Ok(success())
}

// --- caller keys ---

/// A caller key as listed: secret masked.
#[derive(Debug, Serialize)]
pub struct KeyView {
    pub id: String,
    pub name: String,
    pub secret: String,
    pub quota: i64,
    pub used_count: i64,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: String,
    pub updated_at: String,
}

impl KeyView {
    fn masked(k: CallerKey) -> Self {
        Self {
            secret: mask_secret(&k.secret),
            ..Self::revealed(k)
        }
    }

    /// Full secret; only ever returned from creation.
    fn revealed(k: CallerKey) -> Self {
        Self {
            id: k.id,
            name: k.name,
            secret: k.secret,
            quota: k.quota,
            used_count: k.used_count,
            active: k.active,
            expires_at: k.expires_at,
            created_at: k.created_at,
            updated_at: k.updated_at,
        }
    }
}

#[derive(Deserialize)]
pub struct CreateKey {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub quota: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateKey {
    pub name: Option<String>,
    pub quota: Option<i64>,
    pub used_count: Option<i64>,
    pub active: Option<bool>,
    /// `null` or `""` clears the expiry.
    #[serde(default, deserialize_with = "present")]
    pub expires_at: Option<Option<String>>,
}

/// GET /admin/api/keys
pub async fn list_keys(State(state): State<GatewayState>) -> AdminResult<Json<Vec<KeyView>>> {
    let keys = state.orchestrator.store().list_keys().await?;
    Ok(Json(keys.into_iter().map(KeyView::masked).collect()))
}

/// POST /admin/api/keys
pub async fn create_key(
    State(state): State<GatewayState>,
    body: Bytes,
) -> AdminResult<(StatusCode, Json<KeyView>)> {
    let request: CreateKey = parse_json(&body)?;
    let expires_at = request
        .expires_at
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(parse_expiry)
        .transpose()?;
    let name = request
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LABEL.to_string());

    let key = match request.secret.filter(|s| !s.trim().is_empty()) {
        Some(secret) => {
            let now = format_timestamp(Utc::now());
            let key = CallerKey {
                id: uuid::Uuid::new_v4().to_string(),
                name,
                secret: secret.trim().to_string(),
                quota: request.quota.unwrap_or(wirebridge_core::types::UNLIMITED_QUOTA),
                used_count: 0,
                active: true,
                expires_at,
                created_at: now.clone(),
                updated_at: now,
            };
            state.orchestrator.store().insert_key(&key).await?;
            key
        }
        None => {
            state
                .orchestrator
                .keys()
                .issue(&name, request.quota, expires_at)
                .await?
        }
    };
    tracing::info!(key_id = %key.id, name = %key.name, "caller key created");
    Ok((StatusCode::CREATED, Json(KeyView::revealed(key))))
}

/// PUT /admin/api/keys/{id}
pub async fn update_key(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    body: Bytes,
) -> AdminResult<Json<KeyView>> {
    let store = state.orchestrator.store();
    let mut key = store
        .get_key(&id)
        .await?
        .ok_or_else(|| WirebridgeError::NotFound("Caller key".into()))?;
    let request: UpdateKey = parse_json(&body)?;
    if let Some(name) = request.name {
        key.name = name;
    }
    if let Some(quota) = request.quota {
        key.quota = quota;
    }
    if let Some(used) = request.used_count {
        key.used_count = used;
    }
    if let Some(active) = request.active {
        key.active = active;
    }
    if let Some(expiry) = request.expires_at {
        key.expires_at = match expiry.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_expiry(raw)?),
        };
    }
    key.updated_at = format_timestamp(Utc::now());
    if !store.update_key(&key).await? {
        return Err(WirebridgeError::NotFound("Caller key".into()).into());
    }
    Ok(Json(KeyView::masked(key)))
}

/// DELETE /admin/api/keys/{id}
pub async fn delete_key(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> AdminResult<Json<Value>> {
    if !state.orchestrator.store().delete_key(&id).await? {
        return Err(WirebridgeError::NotFound("Caller key".into()).into());
    }
    tracing::info!(key_id = %id, "caller key deleted");
    Ok(success())
}

// --- logs and stats ---

#[derive(Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

/// GET /admin/api/logs?limit=
pub async fn get_logs(
    State(state): State<GatewayState>,
    Query(query): Query<LogsQuery>,
) -> AdminResult<Json<Vec<RequestLogEntry>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    Ok(Json(state.orchestrator.store().recent_logs(limit).await?))
}

#[derive(Deserialize)]
pub struct StatsQuery {
    pub period: Option<String>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub period: StatsPeriod,
    pub since: String,
    #[serde(flatten)]
    pub stats: LogStats,
}

/// GET /admin/api/stats?period=today|week|month
pub async fn get_stats(
    State(state): State<GatewayState>,
    Query(query): Query<StatsQuery>,
) -> AdminResult<Json<StatsResponse>> {
    let period = match query.period.as_deref() {
        None | Some("") => StatsPeriod::Today,
        Some(raw) => raw
            .parse::<StatsPeriod>()
            .map_err(|_| ApiError::invalid("period must be one of today, week, month"))?,
    };
    let since = state.orchestrator.pool().period_start(period, Utc::now());
    let stats = state.orchestrator.store().log_stats(since).await?;
    Ok(Json(StatsResponse {
        period,
        since: format_timestamp(since),
        stats,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_formats() {
        let full = parse_expiry("2026-12-31T23:59:59Z").unwrap();
        assert_eq!(full.to_rfc3339(), "2026-12-31T23:59:59+00:00");
        let date = parse_expiry("2026-12-31").unwrap();
        assert_eq!(date.to_rfc3339(), "2026-12-31T00:00:00+00:00");
        let err = parse_expiry("next tuesday").unwrap_err();
        assert_eq!(err.message(), "Invalid expires_at date format");
    }

    #[test]
    fn update_distinguishes_null_from_absent() {
        let absent: UpdateKey = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.expires_at, None);
        let cleared: UpdateKey = serde_json::from_str(r#"{"expires_at":null}"#).unwrap();
        assert_eq!(cleared.expires_at, Some(None));
        let set: UpdateKey = serde_json::from_str(r#"{"expires_at":"2027-01-01"}"#).unwrap();
        assert_eq!(set.expires_at, Some(Some("2027-01-01".into())));
    }

    #[test]
    fn cookies() {
        let set = session_cookie("abc", 86_400).unwrap();
        assert_eq!(
            set,
            "session=abc; Path=/; HttpOnly; SameSite=Strict; Max-Age=86400"
        );
        let clear = session_cookie("", 0).unwrap();
        assert_eq!(clear, "session=; Path=/; HttpOnly; Max-Age=0");
    }
}
