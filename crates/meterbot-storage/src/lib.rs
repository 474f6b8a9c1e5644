// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite ledger store for meterbot.
//!
//! One `tokio-rusqlite` connection serializes every statement on a single
//! background thread. Each mutation is one atomic statement; nothing here
//! relies on multi-table transactions.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
