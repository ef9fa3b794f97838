// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Wirebridge integration tests.
//!
//! - [`MemoryStore`] implements every store trait in memory
//! - [`MockBackend`] replays scripted realtime backend sessions

pub mod memory_store;
pub mod mock_backend;

pub use memory_store::MemoryStore;
pub use mock_backend::{BackendScript, Finish, MockBackend, query_param};
