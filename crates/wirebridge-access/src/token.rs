// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Expiry claim extraction from JWT-shaped backend credentials.
//!
//! The signature is never checked. The claim only steers credential
//! selection away from tokens the backend would reject anyway.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};

/// The `exp` claim of a three-segment token, if one can be decoded.
pub fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_sig), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_f64()?;
    DateTime::from_timestamp(exp as i64, 0)
}

/// `true` only when an expiry claim exists and is not in the future.
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    jwt_expiry(token).is_some_and(|exp| exp <= now)
}

#[cfg(test)]
pub(crate) fn fake_jwt(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}
