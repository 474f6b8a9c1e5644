// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ZarinPal payment gateway adapter for meterbot.
//!
//! Implements [`PaymentGateway`] over the v4 REST API: `request.json` to
//! obtain an authority and StartPay redirect, `verify.json` to confirm a
//! payment after the browser callback.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use meterbot_config::model::ZarinpalConfig;
use meterbot_core::types::{
    AdapterType, HealthStatus, PaymentHandle, PaymentInitiation, Verification,
};
use meterbot_core::{MeterError, PaymentGateway, PluginAdapter};
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::client::{ApiOutcome, ZarinpalClient};
use crate::types::{CODE_ALREADY_VERIFIED, CODE_SUCCESS};

/// ZarinPal-backed [`PaymentGateway`].
///
/// Merchant id resolution: `zarinpal.merchant_id`, then `ZARINPAL_MERCHANT_ID`.
pub struct ZarinpalGateway {
    client: ZarinpalClient,
}

impl ZarinpalGateway {
    pub fn new(config: &ZarinpalConfig) -> Result<Self, MeterError> {
        let merchant_id = resolve_merchant_id(&config.merchant_id)?;
        let client = ZarinpalClient::new(
            merchant_id,
            config.sandbox,
            Duration::from_secs(config.timeout_secs),
        )?;
        info!(sandbox = config.sandbox, "ZarinPal gateway initialized");
        Ok(Self { client })
    }

    #[cfg(test)]
    fn from_client(client: ZarinpalClient) -> Self {
        Self { client }
    }
}

fn resolve_merchant_id(config_id: &Option<String>) -> Result<SecretString, MeterError> {
    if let Some(id) = config_id
        && !id.is_empty()
    {
        return Ok(SecretString::from(id.clone()));
    }

    std::env::var("ZARINPAL_MERCHANT_ID")
        .ok()
        .filter(|id| !id.is_empty())
        .map(SecretString::from)
        .ok_or_else(|| {
            MeterError::Config(
                "ZarinPal merchant id not found. Set zarinpal.merchant_id in config or ZARINPAL_MERCHANT_ID environment variable.".into(),
            )
        })
}

#[async_trait]
impl PluginAdapter for ZarinpalGateway {
    fn name(&self) -> &str {
        "zarinpal"
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
        debug!("ZarinPal gateway shutting down");
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for ZarinpalGateway {
    async fn initiate(&self, request: &PaymentInitiation) -> Result<PaymentHandle, MeterError> {
        let outcome = self
            .client
            .request_payment(request.amount, &request.description, &request.callback_url)
            .await?;

        match outcome {
            ApiOutcome::Data(data) if data.code == CODE_SUCCESS => {
                let authority = data.authority.filter(|a| !a.is_empty()).ok_or_else(|| {
                    MeterError::upstream("zarinpal", "payment request succeeded without authority")
                })?;
                let redirect_url = self.client.startpay_url(&authority);
                debug!(authority = %authority, amount = request.amount, "payment request accepted");
                Ok(PaymentHandle {
                    authority,
                    redirect_url,
                })
            }
            ApiOutcome::Data(data) => Err(MeterError::upstream(
                "zarinpal",
                format!(
                    "payment request returned code {}: {}",
                    data.code,
                    data.message.unwrap_or_default()
                ),
            )),
            ApiOutcome::Rejected(errors) => {
                warn!(code = errors.code, message = %errors.message, "payment request rejected");
                Err(MeterError::upstream(
                    "zarinpal",
                    format!("payment request rejected: {errors}"),
                ))
            }
        }
    }

    async fn verify(&self, authority: &str, amount: i64) -> Result<Verification, MeterError> {
        match self.client.verify_payment(authority, amount).await? {
            ApiOutcome::Data(data)
                if data.code == CODE_SUCCESS || data.code == CODE_ALREADY_VERIFIED =>
            {
                let ref_id = data.ref_id.ok_or_else(|| {
                    MeterError::upstream("zarinpal", "verification succeeded without ref_id")
                })?;
                debug!(
                    authority,
                    code = data.code,
                    ref_id = %ref_id,
                    card_pan = data.card_pan.as_deref().unwrap_or(""),
                    "payment verified"
                );
                Ok(Verification {
                    ref_id: ref_id.to_string(),
                })
            }
            ApiOutcome::Data(data) => Err(MeterError::VerificationFailed {
                message: format!(
                    "{} - {}",
                    data.code,
                    data.message.unwrap_or_default()
                ),
            }),
            ApiOutcome::Rejected(errors) => Err(MeterError::VerificationFailed {
                message: errors.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(base_url: &str) -> ZarinpalGateway {
        let client = ZarinpalClient::new(
            SecretString::from("merchant-123".to_string()),
            false,
            Duration::from_secs(5),
        )
        .unwrap()
        .with_base_url(base_url);
        ZarinpalGateway::from_client(client)
    }

    fn initiation() -> PaymentInitiation {
        PaymentInitiation {
            amount: 1000,
            description: "Purchase of Basic plan".into(),
            callback_url: "http://localhost/zarinpal_callback?payment_id=1&user_id=7-0".into(),
        }
    }

    #[test]
    fn configured_merchant_id_wins() {
        assert!(resolve_merchant_id(&Some("m".into())).is_ok());
    }

    #[test]
    fn missing_merchant_id_is_config_error() {
        if let Err(err) = resolve_merchant_id(&Some(String::new())) {
            assert!(matches!(err, MeterError::Config(_)));
        }
    }

    #[tokio::test]
    async fn initiate_returns_startpay_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pg/v4/payment/request.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"code": 100, "message": "Success", "authority": "A00042"},
                "errors": []
            })))
            .mount(&server)
            .await;

        let handle = gateway(&server.uri()).initiate(&initiation()).await.unwrap();
        assert_eq!(handle.authority, "A00042");
        assert_eq!(
            handle.redirect_url,
            format!("{}/pg/StartPay/A00042", server.uri())
        );
    }

    #[tokio::test]
    async fn initiate_rejection_is_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [],
                "errors": {"code": -10, "message": "Terminal is not valid.", "validations": []}
            })))
            .mount(&server)
            .await;

        let err = gateway(&server.uri()).initiate(&initiation()).await.unwrap_err();
        assert!(err.is_upstream_failure());
        assert!(err.to_string().contains("-10"));
    }

    #[tokio::test]
    async fn verify_accepts_already_verified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pg/v4/payment/verify.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"code": 101, "message": "Verified", "ref_id": 201, "card_pan": "502229******5995"},
                "errors": []
            })))
            .mount(&server)
            .await;

        let verification = gateway(&server.uri()).verify("A00042", 1000).await.unwrap();
        assert_eq!(verification.ref_id, "201");
    }

    #[tokio::test]
    async fn verify_rejection_is_verification_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [],
                "errors": {"code": -51, "message": "Session is not valid.", "validations": []}
            })))
            .mount(&server)
            .await;

        let err = gateway(&server.uri()).verify("A00042", 1000).await.unwrap_err();
        match err {
            MeterError::VerificationFailed { message } => assert!(message.starts_with("-51")),
            other => panic!("expected VerificationFailed, got {other:?}"),
        }
    }
}
