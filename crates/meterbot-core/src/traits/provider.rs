// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AI provider trait (prompt in, text out).

use async_trait::async_trait;

use crate::error::MeterError;
use crate::traits::adapter::PluginAdapter;

/// Single-turn generative AI provider.
///
/// [`PluginAdapter::name`] doubles as the provider component of the answer
/// cache key, so it must be stable across restarts.
#[async_trait]
pub trait AnswerProvider: PluginAdapter {
    /// Sends `prompt` and returns the answer text.
    ///
    /// Network errors, non-success statuses and malformed or empty payloads
    /// all surface as [`MeterError::UpstreamCallFailed`].
    async fn answer(&self, prompt: &str) -> Result<String, MeterError>;
}
