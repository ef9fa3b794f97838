// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Wirebridge gateway.
//!
//! This crate provides the error taxonomy, the records exchanged with the
//! persistence collaborator, and the store traits the gateway core is written
//! against.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{AttachmentStep, AuthFailure, WirebridgeError};
pub use types::{
    AttachmentDescriptor, AttachmentKind, BackendCredential, CallerKey, HealthStatus, LogStats,
    RateKind, RequestLogEntry, StatsPeriod, format_timestamp,
};

pub use traits::{
    AdminSessionStore, CallerKeyStore, CredentialStore, PluginAdapter, RateLimitStore,
    RequestLog, StorageAdapter,
};

/// Everything the orchestrator needs from persistence, as one object-safe bound.
pub trait GatewayStore:
    CredentialStore + CallerKeyStore + RateLimitStore + RequestLog + AdminSessionStore
{
}

impl<T> GatewayStore for T where
    T: CredentialStore + CallerKeyStore + RateLimitStore + RequestLog + AdminSessionStore
{
}
