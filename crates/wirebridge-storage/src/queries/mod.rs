// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Each function takes `&Database` and runs on the
//! single writer thread.

pub mod admin_sessions;
pub mod caller_keys;
pub mod credentials;
pub mod rate_limits;
pub mod request_logs;
