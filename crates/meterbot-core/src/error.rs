// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for meterbot.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all meterbot adapter traits and core operations.
#[derive(Debug, Error)]
pub enum MeterError {
    /// Configuration errors (invalid TOML, missing credentials, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A user, plan or payment record does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// The user's balance cannot cover the requested debit.
    #[error("insufficient credit for user {user_key}")]
    InsufficientCredit { user_key: String },

    /// The user sent a message before the rate-limit window elapsed.
    #[error("rate limited, retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The AI provider or the payment provider failed (network, status, parse).
    #[error("upstream call to {service} failed: {message}")]
    UpstreamCallFailed {
        service: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The payment provider rejected verification of a payment.
    #[error("payment verification failed: {message}")]
    VerificationFailed { message: String },

    /// A terminal state was reached but a dependent side effect (refund,
    /// plan credit grant) could not be confirmed. Requires operator attention.
    #[error("inconsistent state: {message}")]
    Inconsistent { message: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MeterError {
    /// Wraps any storage-layer error.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(err),
        }
    }

    /// Builds a [`MeterError::NotFound`] for the given entity kind and key.
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Builds a [`MeterError::UpstreamCallFailed`] without an underlying source.
    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamCallFailed {
            service: service.into(),
            message: message.into(),
            source: None,
        }
    }

    /// True for failures of an external call: upstream errors and timeouts.
    pub fn is_upstream_failure(&self) -> bool {
        matches!(self, Self::UpstreamCallFailed { .. } | Self::Timeout { .. })
    }
}
