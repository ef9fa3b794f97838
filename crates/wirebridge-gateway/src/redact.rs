// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret scrubbing for error text that leaves the process.
//!
//! Backend failures can echo request URLs or headers, which carry the
//! credential token. Anything written to a caller response or to the request
//! log passes through [`redact`] first.

use std::sync::LazyLock;

use regex::Regex;

static REDACTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Bearer tokens in echoed headers
        r"Bearer\s+[A-Za-z0-9._\-]{10,}",
        // token=... in echoed socket URLs
        r"token=[^&\s]+",
        // caller key secrets
        r"ck-[A-Za-z0-9]{16,}",
        // JWTs
        r"eyJ[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

const REDACTED: &str = "[REDACTED]";

/// Replace every known secret shape in `input`.
pub fn redact(input: &str) -> String {
    let mut result = input.to_string();
    for pattern in REDACTION_PATTERNS.iter() {
        result = pattern.replace_all(&result, REDACTED).into_owned();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_patterns_compile() {
        assert_eq!(REDACTION_PATTERNS.len(), 4);
    }

    #[test]
    fn scrubs_bearer_and_query_tokens() {
        let input = "connect to wss://api.test/socket.io/?token=abc.def.ghi&EIO=4 failed; \
                     header Bearer abcdefghijklmnop";
        let out = redact(input);
        assert!(!out.contains("abc.def.ghi"));
        assert!(!out.contains("abcdefghijklmnop"));
        assert!(out.contains("EIO=4"));
    }

    #[test]
    fn scrubs_caller_secrets_and_jwts() {
        let out = redact("key ck-AAAABBBBCCCCDDDDEEEE rejected");
        assert_eq!(out, "key [REDACTED] rejected");

        let jwt = "eyJhbGciOiJIUzI1NiJ9.eyJleHAiOjF9.c2lnbmF0dXJl";
        assert_eq!(redact(jwt), REDACTED);
    }

    #[test]
    fn leaves_plain_text_alone() {
        let input = "upstream response timed out after 120s";
        assert_eq!(redact(input), input);
    }
}
