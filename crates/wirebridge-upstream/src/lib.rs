// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Everything that talks to the realtime backend.
//!
//! - [`frame`]: text frame codec
//! - [`session`]: the per-request state machine
//! - [`bridge`]: the websocket driver with timers, retry and streaming
//! - [`attachments`]: the presign/PUT/complete upload pipeline
//! - [`fetch`]: the guarded downloader for caller-supplied URLs

pub mod attachments;
pub mod bridge;
pub mod fetch;
pub mod frame;
pub mod ids;
pub mod session;

pub use attachments::{AttachmentPipeline, AttachmentSource, AttachmentSpec, guess_mime};
pub use bridge::{Bridge, BridgeConfig, BridgeEvent};
pub use frame::{BackendEvent, Frame, UserMessage};
pub use session::{Action, BridgeSession, SessionState};
