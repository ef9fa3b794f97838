// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Zero-width watermark carried in caller system prompts.
//!
//! A token `v1|<bucket>|<signature>` is encoded as invisible code points,
//! four per byte, two bits per code point (high bits first). The signature is
//! FNV-1a over `version|bucket|prompt|salt`, where `prompt` is the text with
//! every zero-width symbol removed, rendered in lowercase base 36.

use chrono::Utc;
use thiserror::Error;
use wirebridge_config::model::WatermarkConfig;

/// Symbol alphabet; the index of each code point is the two-bit value it carries.
pub const ZERO_WIDTH: [char; 4] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{200E}'];

pub const WATERMARK_VERSION: &str = "v1";

/// Width of one time bucket.
pub const BUCKET_MILLIS: i64 = 60_000;

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// Why a prompt failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatermarkFailure {
    #[error("no watermark found")]
    NoWatermark,
    #[error("invalid token format")]
    BadFormat,
    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),
    #[error("bucket expired (diff: {0})")]
    BucketDrift(i64),
    #[error("signature mismatch")]
    SignatureMismatch,
}

fn symbol_value(c: char) -> Option<u8> {
    ZERO_WIDTH.iter().position(|z| *z == c).map(|i| i as u8)
}

/// Decode the hidden token, or `None` when the symbol count cannot form bytes.
///
/// Invalid UTF-8 is replaced with U+FFFD, so a corrupt payload still surfaces
/// as a malformed token rather than as a missing one.
pub fn decode_zero_width(text: &str) -> Option<String> {
    let symbols: Vec<u8> = text.chars().filter_map(symbol_value).collect();
    if symbols.len() < 4 || symbols.len() % 4 != 0 {
        return None;
    }
    let bytes: Vec<u8> = symbols
        .chunks_exact(4)
        .map(|quad| quad.iter().fold(0u8, |acc, v| (acc << 2) | v))
        .collect();
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Render `token` as zero-width symbols.
pub fn encode_zero_width(token: &str) -> String {
    let mut out = String::with_capacity(token.len() * 4 * 3);
    for byte in token.bytes() {
        for shift in [6u8, 4, 2, 0] {
            out.push(ZERO_WIDTH[usize::from((byte >> shift) & 0b11)]);
        }
    }
    out
}

/// Remove every watermark symbol.
pub fn strip_zero_width(text: &str) -> String {
    text.chars().filter(|c| !ZERO_WIDTH.contains(c)).collect()
}

/// FNV-1a, 32-bit, over UTF-16 code units.
pub fn fnv1a32(input: &str) -> u32 {
    input.encode_utf16().fold(FNV_OFFSET_BASIS, |hash, unit| {
        (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    })
}

/// Lowercase base-36 rendering.
pub fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn bucket_for(unix_millis: i64) -> i64 {
    unix_millis.div_euclid(BUCKET_MILLIS)
}

fn signature(version: &str, bucket: &str, stripped: &str, salt: &str) -> String {
    to_base36(fnv1a32(&format!("{version}|{bucket}|{stripped}|{salt}")))
}

/// Verifier bound to a salt and a clock-skew tolerance.
#[derive(Clone)]
pub struct WatermarkVerifier {
    salt: String,
    tolerance_buckets: i64,
}

impl WatermarkVerifier {
    pub fn new(salt: impl Into<String>, tolerance_buckets: i64) -> Self {
        Self {
            salt: salt.into(),
            tolerance_buckets,
        }
    }

    pub fn from_config(config: &WatermarkConfig) -> Self {
        Self::new(config.salt.clone(), config.tolerance_buckets)
    }

    /// Verify against the wall clock. Returns the stripped prompt on success.
    pub fn verify(&self, text: &str) -> Result<String, WatermarkFailure> {
        self.verify_at(text, Utc::now().timestamp_millis())
    }

    /// Verify as if the current time were `now_millis`.
    ///
    /// Bucket drift is checked before the signature.
    pub fn verify_at(&self, text: &str, now_millis: i64) -> Result<String, WatermarkFailure> {
        let token = decode_zero_width(text).ok_or(WatermarkFailure::NoWatermark)?;
        let stripped = strip_zero_width(text);

        let mut parts = token.split('|');
        let (Some(version), Some(bucket_raw), Some(sig), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(WatermarkFailure::BadFormat);
        };
        if version != WATERMARK_VERSION {
            return Err(WatermarkFailure::UnsupportedVersion(version.to_string()));
        }
        let bucket: i64 = bucket_raw
            .parse()
            .map_err(|_| WatermarkFailure::BadFormat)?;

        let drift = (bucket_for(now_millis) - bucket).abs();
        if drift > self.tolerance_buckets {
            return Err(WatermarkFailure::BucketDrift(drift));
        }

        if sig != signature(version, bucket_raw, &stripped, &self.salt) {
            return Err(WatermarkFailure::SignatureMismatch);
        }
        Ok(stripped)
    }

    /// Produce `prompt` with a token for `bucket` appended invisibly.
    pub fn sign(&self, prompt: &str, bucket: i64) -> String {
        let stripped = strip_zero_width(prompt);
        let bucket = bucket.to_string();
        let sig = signature(WATERMARK_VERSION, &bucket, &stripped, &self.salt);
        let token = format!("{WATERMARK_VERSION}|{bucket}|{sig}");
        format!("{stripped}{}", encode_zero_width(&token))
    }

    /// Sign for the current bucket.
    pub fn sign_now(&self, prompt: &str) -> String {
        self.sign(prompt, bucket_for(Utc::now().timestamp_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NOW: i64 = 1_780_000_000_000;

    fn verifier() -> WatermarkVerifier {
        WatermarkVerifier::new("vbdo-wm-2026", 1)
    }

    #[test]
    fn fnv_reference_values() {
        assert_eq!(fnv1a32(""), 2_166_136_261);
        assert_eq!(fnv1a32("a"), 0xe40c_292c);
        // "é" is one UTF-16 unit, so it hashes like a single code unit 0xE9.
        let mut h = FNV_OFFSET_BASIS;
        h = (h ^ 0xE9).wrapping_mul(FNV_PRIME);
        assert_eq!(fnv1a32("é"), h);
    }

    #[test]
    fn base36_rendering() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(u32::MAX), "1z141z3");
    }

    #[test]
    fn accepts_within_tolerance() {
        let v = verifier();
        let bucket = bucket_for(NOW);
        let signed = v.sign("You are helpful.", bucket);
        assert_ne!(signed, "You are helpful.");

        for offset in [-1, 0, 1] {
            let now = NOW + offset * BUCKET_MILLIS;
            assert_eq!(v.verify_at(&signed, now).unwrap(), "You are helpful.");
        }
    }

    #[test]
    fn rejects_two_buckets_away() {
        let v = verifier();
        let signed = v.sign("prompt", bucket_for(NOW));
        assert_eq!(
            v.verify_at(&signed, NOW + 2 * BUCKET_MILLIS),
            Err(WatermarkFailure::BucketDrift(2))
        );
        assert_eq!(
            v.verify_at(&signed, NOW - 2 * BUCKET_MILLIS),
            Err(WatermarkFailure::BucketDrift(2))
        );
    }

    #[test]
    fn tampered_prompt_fails_signature() {
        let v = verifier();
        let signed = v.sign("original", bucket_for(NOW));
        let tampered = signed.replacen("original", "0riginal", 1);
        assert_eq!(
            v.verify_at(&tampered, NOW),
            Err(WatermarkFailure::SignatureMismatch)
        );
    }

    #[test]
    fn wrong_salt_fails_signature() {
        let signed = verifier().sign("p", bucket_for(NOW));
        let other = WatermarkVerifier::new("other-salt", 1);
        assert_eq!(
            other.verify_at(&signed, NOW),
            Err(WatermarkFailure::SignatureMismatch)
        );
    }

    #[test]
    fn symbols_may_be_scattered_through_the_prompt() {
        let v = verifier();
        let signed = v.sign("hello world", bucket_for(NOW));
        let hidden: String = signed.chars().filter(|c| ZERO_WIDTH.contains(c)).collect();
        let (first, second) = hidden.split_at(hidden.len() / 2);
        let scattered = format!("hello{first} world{second}");
        assert_eq!(v.verify_at(&scattered, NOW).unwrap(), "hello world");
    }

    #[test]
    fn malformed_tokens() {
        let v = verifier();
        assert_eq!(v.verify_at("plain", NOW), Err(WatermarkFailure::NoWatermark));

        let three_symbols = format!("x{}{}{}", ZERO_WIDTH[0], ZERO_WIDTH[1], ZERO_WIDTH[2]);
        assert_eq!(
            v.verify_at(&three_symbols, NOW),
            Err(WatermarkFailure::NoWatermark)
        );

        let two_fields = format!("p{}", encode_zero_width("v1|123"));
        assert_eq!(v.verify_at(&two_fields, NOW), Err(WatermarkFailure::BadFormat));

        let bad_bucket = format!("p{}", encode_zero_width("v1|soon|abc"));
        assert_eq!(v.verify_at(&bad_bucket, NOW), Err(WatermarkFailure::BadFormat));

        let v2 = format!("p{}", encode_zero_width("v2|1|abc"));
        assert_eq!(
            v.verify_at(&v2, NOW),
            Err(WatermarkFailure::UnsupportedVersion("v2".into()))
        );
    }

    fn hide_bytes(bytes: &[u8]) -> String {
        bytes
            .iter()
            .flat_map(|b| [6u8, 4, 2, 0].map(|s| ZERO_WIDTH[usize::from((b >> s) & 0b11)]))
            .collect()
    }

    #[test]
    fn invalid_utf8_payload_is_a_malformed_token() {
        let v = WatermarkVerifier::new("salt", 1);

        // 0xFF alone is not valid UTF-8.
        let lone = hide_bytes(&[0xFF]);
        assert_eq!(decode_zero_width(&lone).as_deref(), Some("\u{FFFD}"));
        assert_eq!(
            v.verify_at(&format!("p{lone}"), NOW),
            Err(WatermarkFailure::BadFormat)
        );

        let mangled = hide_bytes(b"v\xFF|1|abc");
        assert_eq!(
            v.verify_at(&format!("p{mangled}"), NOW),
            Err(WatermarkFailure::UnsupportedVersion("v\u{FFFD}".into()))
        );
    }

    proptest! {
        #[test]
        fn zero_width_codec_round_trips(s in ".*") {
            let encoded = encode_zero_width(&s);
            if s.is_empty() {
                prop_assert_eq!(decode_zero_width(&encoded), None);
            } else {
                prop_assert_eq!(decode_zero_width(&encoded), Some(s));
            }
        }
    }
}
