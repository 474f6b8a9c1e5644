// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Google Gemini answer provider for meterbot.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use meterbot_config::model::GeminiConfig;
use meterbot_core::types::{AdapterType, HealthStatus};
use meterbot_core::{AnswerProvider, MeterError, PluginAdapter};
use secrecy::SecretString;
use tracing::{debug, info};

use crate::client::GeminiClient;
use crate::types::GenerateContentRequest;

/// [`AnswerProvider`] backed by Gemini `generateContent`.
///
/// API key resolution: `gemini.api_key`, then `GEMINI_API_KEY`.
pub struct GeminiProvider {
    client: GeminiClient,
}

impl GeminiProvider {
    pub fn new(config: &GeminiConfig) -> Result<Self, MeterError> {
        let api_key = resolve_api_key(&config.api_key)?;
        let client = GeminiClient::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )?;
        info!(model = %config.model, "Gemini provider initialized");
        Ok(Self { client })
    }
}

fn resolve_api_key(config_key: &Option<String>) -> Result<SecretString, MeterError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(SecretString::from(key.clone()));
    }

    std::env::var("GEMINI_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
        .map(SecretString::from)
        .ok_or_else(|| {
            MeterError::Config(
                "Gemini API key not found. Set gemini.api_key in config or GEMINI_API_KEY environment variable.".into(),
            )
        })
}

#[async_trait]
impl PluginAdapter for GeminiProvider {
    /// Also the provider half of the answer cache key.
    fn name(&self) -> &str {
        "gemini"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, MeterError> {
        // A test request would spend quota.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MeterError> {
        debug!("Gemini provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl AnswerProvider for GeminiProvider {
    async fn answer(&self, prompt: &str) -> Result<String, MeterError> {
        let response = self
            .client
            .generate(&GenerateContentRequest::from_prompt(prompt))
            .await?;
        let text = response.answer_text().ok_or_else(|| {
            MeterError::upstream("gemini", "response carried no answer text")
        })?;
        debug!(model = %self.client.model(), chars = text.len(), "gemini answered");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> GeminiConfig {
        GeminiConfig {
            api_key: Some("test-key".into()),
            model: "gemini-test".into(),
            base_url: base_url.into(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn api_key_from_config_wins() {
        assert!(resolve_api_key(&Some("k".into())).is_ok());
    }

    #[test]
    fn missing_api_key_names_both_sources() {
        if let Err(err) = resolve_api_key(&None) {
            let text = err.to_string();
            assert!(text.contains("gemini.api_key") && text.contains("GEMINI_API_KEY"));
        }
    }

    #[tokio::test]
    async fn answer_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "42"}]}}]
            })))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(&config(&server.uri())).unwrap();
        assert_eq!(provider.name(), "gemini");
        assert_eq!(provider.answer("meaning of life?").await.unwrap(), "42");
    }

    #[tokio::test]
    async fn empty_candidates_are_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(&config(&server.uri())).unwrap();
        let err = provider.answer("q").await.unwrap_err();
        assert!(err.is_upstream_failure());
    }
}
