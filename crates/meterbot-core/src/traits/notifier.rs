// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Out-of-band user notification through the chat transport.

use async_trait::async_trait;

use crate::error::MeterError;
use crate::types::UserKey;

/// Delivers a plain-text message to a user outside a request/reply exchange,
/// e.g. after a payment callback settles.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, user_key: &UserKey, text: &str) -> Result<(), MeterError>;
}
