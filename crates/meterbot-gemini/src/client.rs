// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Gemini `generateContent` endpoint.
//!
//! Retries once on transient statuses (429, 500, 503).

use std::time::Duration;

use meterbot_core::MeterError;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::types::{ApiErrorResponse, GenerateContentRequest, GenerateContentResponse};

const SERVICE: &str = "gemini";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl GeminiClient {
    pub fn new(
        api_key: SecretString,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, MeterError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MeterError::UpstreamCallFailed {
                service: SERVICE.into(),
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: 1,
            retry_delay: Duration::from_secs(1),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    #[cfg(test)]
    pub(crate) fn without_retry_delay(mut self) -> Self {
        self.retry_delay = Duration::ZERO;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    pub async fn generate(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, MeterError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying gemini request after transient error");
                tokio::time::sleep(self.retry_delay).await;
            }

            let response = self
                .client
                .post(self.endpoint())
                .query(&[("key", self.api_key.expose_secret())])
                .json(request)
                .send()
                .await
                .map_err(|e| {
                    // The request URL carries the API key.
                    let e = e.without_url();
                    MeterError::UpstreamCallFailed {
                        service: SERVICE.into(),
                        message: format!("HTTP request failed: {e}"),
                        source: Some(Box::new(e)),
                    }
                })?;

            let status = response.status();
            debug!(status = %status, attempt, "gemini response received");

            if status.is_success() {
                let body = response.text().await.map_err(|e| MeterError::UpstreamCallFailed {
                    service: SERVICE.into(),
                    message: format!("failed to read response body: {e}"),
                    source: None,
                })?;
                return serde_json::from_str(&body).map_err(|e| MeterError::UpstreamCallFailed {
                    service: SERVICE.into(),
                    message: format!("failed to parse response: {e}"),
                    source: Some(Box::new(e)),
                });
            }

            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api) => format!(
                    "Gemini API error ({}): {}",
                    api.error.status.as_deref().unwrap_or("UNKNOWN"),
                    api.error.message
                ),
                Err(_) => format!("API returned {status}: {body}"),
            };

            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, "transient gemini error, will retry");
                last_error = Some(MeterError::upstream(SERVICE, message));
                continue;
            }
            return Err(MeterError::upstream(SERVICE, message));
        }

        Err(last_error
            .unwrap_or_else(|| MeterError::upstream(SERVICE, "request failed after retries")))
    }
}

fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503)
}
