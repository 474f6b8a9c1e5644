// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment provider trait (redirect + callback + verify flow).

use async_trait::async_trait;

use crate::error::MeterError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{PaymentHandle, PaymentInitiation, Verification};

/// Third-party payment provider.
#[async_trait]
pub trait PaymentGateway: PluginAdapter {
    /// Requests a payment-initiation handle (authority + hosted payment URL).
    async fn initiate(&self, request: &PaymentInitiation) -> Result<PaymentHandle, MeterError>;

    /// Verifies a paid authority for `amount`.
    ///
    /// Returns [`MeterError::VerificationFailed`] when the provider rejects the
    /// verification and [`MeterError::UpstreamCallFailed`] on transport errors.
    async fn verify(&self, authority: &str, amount: i64) -> Result<Verification, MeterError>;
}
