// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock payment gateway with scripted initiation and verification results.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use meterbot_core::types::{
    AdapterType, HealthStatus, PaymentHandle, PaymentInitiation, Verification,
};
use meterbot_core::{MeterError, PaymentGateway, PluginAdapter};

/// Authorities are issued as `AUTH-{n}`, starting at 1.
pub struct MockPaymentGateway {
    issued: AtomicUsize,
    initiations: Mutex<Vec<PaymentInitiation>>,
    verifications: Mutex<Vec<(String, i64)>>,
    failing_initiations: Mutex<VecDeque<MeterError>>,
    failing_verifications: Mutex<VecDeque<MeterError>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self {
            issued: AtomicUsize::new(0),
            initiations: Mutex::new(Vec::new()),
            verifications: Mutex::new(Vec::new()),
            failing_initiations: Mutex::new(VecDeque::new()),
            failing_verifications: Mutex::new(VecDeque::new()),
        }
    }

    /// The next `initiate` call fails with `error`.
    pub async fn fail_next_initiation(&self, error: MeterError) {
        self.failing_initiations.lock().await.push_back(error);
    }

    /// The next `verify` call fails with `error`.
    pub async fn fail_next_verification(&self, error: MeterError) {
        self.failing_verifications.lock().await.push_back(error);
    }

    pub async fn initiations(&self) -> Vec<PaymentInitiation> {
        self.initiations.lock().await.clone()
    }

    /// `(authority, amount)` of every verify call.
    pub async fn verifications(&self) -> Vec<(String, i64)> {
        self.verifications.lock().await.clone()
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockPaymentGateway {
    fn name(&self) -> &str {
        "mock-payment"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Payment
    }

    async fn health_check(&self) -> Result<HealthStatus, MeterError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MeterError> {
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn initiate(&self, request: &PaymentInitiation) -> Result<PaymentHandle, MeterError> {
        self.initiations.lock().await.push(request.clone());
        if let Some(err) = self.failing_initiations.lock().await.pop_front() {
            return Err(err);
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let authority = format!("AUTH-{n}");
        Ok(PaymentHandle {
            redirect_url: format!("https://pay.test/StartPay/{authority}"),
            authority,
        })
    }

    async fn verify(&self, authority: &str, amount: i64) -> Result<Verification, MeterError> {
        self.verifications
            .lock()
            .await
            .push((authority.to_string(), amount));
        if let Some(err) = self.failing_verifications.lock().await.pop_front() {
            return Err(err);
        }
        Ok(Verification {
            ref_id: format!("REF-{authority}"),
        })
    }
}
