// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! The gateway core only reaches persistence through these traits, so the
//! SQLite implementation and the in-memory test doubles are interchangeable.

pub mod adapter;
pub mod storage;

pub use adapter::PluginAdapter;
pub use storage::{
    AdminSessionStore, CallerKeyStore, CredentialStore, RateLimitStore, RequestLog,
    StorageAdapter,
};
