// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Wirebridge gateway.
//!
//! Provides connection management with WAL mode, embedded refinery
//! migrations, a single-writer concurrency model via `tokio-rusqlite`, and
//! typed queries for credentials, caller keys, rate windows, the request log,
//! and admin sessions. [`SqliteStorage`] implements every store trait from
//! `wirebridge-core`.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
