// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admission control for the Wirebridge gateway.
//!
//! Everything a request passes through before a backend connection is
//! opened: caller key validation, fixed-window rate limiting, the system
//! prompt watermark, and backend credential selection.

pub mod keys;
pub mod pool;
pub mod ratelimit;
pub mod token;
pub mod watermark;

pub use keys::{KeyRegistry, generate_secret, mask_secret};
pub use pool::{CredentialPool, new_credential};
pub use ratelimit::{RateDecision, RateLimiter};
pub use watermark::{WatermarkFailure, WatermarkVerifier};
