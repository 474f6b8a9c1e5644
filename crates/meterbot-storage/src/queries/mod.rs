// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed queries, one module per table.

pub mod cache;
pub mod messages;
pub mod payments;
pub mod plans;
pub mod users;

/// Current instant in the stored timestamp format.
pub(crate) fn now() -> String {
    meterbot_core::types::format_timestamp(chrono::Utc::now())
}
