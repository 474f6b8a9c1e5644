// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the ZarinPal v4 payment API.

use std::time::Duration;

use meterbot_core::MeterError;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::types::{
    Envelope, PaymentRequestBody, PaymentRequestData, ProviderErrors, VerifyData,
    VerifyRequestBody,
};

const SERVICE: &str = "zarinpal";

const PRODUCTION_API: &str = "https://api.zarinpal.com";
const PRODUCTION_STARTPAY: &str = "https://www.zarinpal.com/pg/StartPay/";
const SANDBOX_API: &str = "https://sandbox.zarinpal.com";
const SANDBOX_STARTPAY: &str = "https://sandbox.zarinpal.com/pg/StartPay/";

/// Parsed response of one API call: the `data` side or the `errors` side.
#[derive(Debug)]
pub enum ApiOutcome<T> {
    Data(T),
    Rejected(ProviderErrors),
}

#[derive(Debug, Clone)]
pub struct ZarinpalClient {
    client: reqwest::Client,
    merchant_id: SecretString,
    api_base: String,
    startpay_base: String,
}

impl ZarinpalClient {
    pub fn new(
        merchant_id: SecretString,
        sandbox: bool,
        timeout: Duration,
    ) -> Result<Self, MeterError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| MeterError::UpstreamCallFailed {
                service: SERVICE.into(),
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        let (api_base, startpay_base) = if sandbox {
            (SANDBOX_API, SANDBOX_STARTPAY)
        } else {
            (PRODUCTION_API, PRODUCTION_STARTPAY)
        };

        Ok(Self {
            client,
            merchant_id,
            api_base: api_base.to_string(),
            startpay_base: startpay_base.to_string(),
        })
    }

    /// Points both the API and the StartPay redirect at a test server.
    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, base_url: &str) -> Self {
        self.api_base = base_url.trim_end_matches('/').to_string();
        self.startpay_base = format!("{}/pg/StartPay/", self.api_base);
        self
    }

    /// Browser redirect URL for an authority.
    pub fn startpay_url(&self, authority: &str) -> String {
        format!("{}{authority}", self.startpay_base)
    }

    pub async fn request_payment(
        &self,
        amount: i64,
        description: &str,
        callback_url: &str,
    ) -> Result<ApiOutcome<PaymentRequestData>, MeterError> {
        let body = PaymentRequestBody {
            merchant_id: self.merchant_id.expose_secret(),
            amount,
            description,
            callback_url,
        };
        self.post("/pg/v4/payment/request.json", &body).await
    }

    pub async fn verify_payment(
        &self,
        authority: &str,
        amount: i64,
    ) -> Result<ApiOutcome<VerifyData>, MeterError> {
        let body = VerifyRequestBody {
            merchant_id: self.merchant_id.expose_secret(),
            authority,
            amount,
        };
        self.post("/pg/v4/payment/verify.json", &body).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<ApiOutcome<T>, MeterError>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.api_base);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| MeterError::UpstreamCallFailed {
                service: SERVICE.into(),
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(status = %status, path, "zarinpal response received");

        let text = response
            .text()
            .await
            .map_err(|e| MeterError::UpstreamCallFailed {
                service: SERVICE.into(),
                message: format!("failed to read response body: {e}"),
                source: Some(Box::new(e)),
            })?;

        // Validation failures arrive as 4xx with a regular envelope.
        let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| {
            MeterError::upstream(
                SERVICE,
                format!("unparsable response (HTTP {status}): {e}"),
            )
        })?;

        if let Some(errors) = envelope.errors.into_option() {
            return Ok(ApiOutcome::Rejected(errors));
        }
        match envelope.data.into_option() {
            Some(data) => Ok(ApiOutcome::Data(data)),
            None => Err(MeterError::upstream(
                SERVICE,
                format!("response without data or errors (HTTP {status})"),
            )),
        }
    }
}
