// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for meterbot.
//!
//! This crate provides the domain types (users, plans, payments, cache
//! entries, history records), the [`MeterError`] taxonomy, and the adapter
//! traits the rest of the workspace is wired through. Storage, the AI
//! provider, the payment provider and the chat transport are all injected
//! as trait objects defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::MeterError;
pub use types::{
    AdapterType, HealthStatus, Payment, PaymentStatus, Plan, Platform, User, UserKey,
};

// Re-export all adapter traits at crate root.
pub use traits::{AnswerProvider, LedgerStore, Notifier, PaymentGateway, PluginAdapter};
