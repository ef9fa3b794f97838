// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible HTTP/SSE gateway in front of the realtime backend.
//!
//! Callers speak `/chat/completions` and `/responses`; each request is
//! admitted by the [`Orchestrator`] (caller key, rate windows, watermark,
//! credential selection, attachment upload) and then bridged to a single
//! backend session, aggregated or streamed back as Server-Sent Events.

pub mod admin;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod openai;
pub mod orchestrator;
pub mod redact;
pub mod server;
pub mod sse;

pub use error::ApiError;
pub use orchestrator::{ClientMeta, Orchestrator};
pub use server::{GatewayState, HealthState, bind, build_router, start_server};
