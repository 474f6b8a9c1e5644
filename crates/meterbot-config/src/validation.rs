// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks run after deserialization.
//!
//! All failures are collected so the operator sees every problem at once.

use crate::diagnostic::ConfigError;
use crate::model::MeterConfig;

pub fn validate_config(config: &MeterConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.bot.initial_credits < 0 {
        fail(format!(
            "bot.initial_credits must be non-negative, got {}",
            config.bot.initial_credits
        ));
    }

    if config.limits.rate_limit_secs == 0 {
        fail("limits.rate_limit_secs must be at least 1".to_string());
    }

    if config.limits.cache_ttl_secs == 0 {
        fail("limits.cache_ttl_secs must be at least 1".to_string());
    }

    if config.gemini.timeout_secs == 0 {
        fail("gemini.timeout_secs must be at least 1".to_string());
    }

    if config.zarinpal.timeout_secs == 0 {
        fail("zarinpal.timeout_secs must be at least 1".to_string());
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        fail("gateway.host must not be empty".to_string());
    } else {
        let is_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
        if !is_ip && !is_hostname {
            fail(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }

    let base = config.gateway.public_base_url.trim();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        fail(format!(
            "gateway.public_base_url `{base}` must start with http:// or https://"
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_message(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&MeterConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails() {
        let mut config = MeterConfig::default();
        config.storage.database_path = "  ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "database_path"));
    }

    #[test]
    fn zero_windows_fail() {
        let mut config = MeterConfig::default();
        config.limits.rate_limit_secs = 0;
        config.limits.cache_ttl_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(has_message(&errors, "rate_limit_secs"));
        assert!(has_message(&errors, "cache_ttl_secs"));
    }

    #[test]
    fn negative_initial_credits_fail() {
        let mut config = MeterConfig::default();
        config.bot.initial_credits = -1;
        assert!(has_message(
            &validate_config(&config).unwrap_err(),
            "initial_credits"
        ));
    }

    #[test]
    fn bad_gateway_settings_fail() {
        let mut config = MeterConfig::default();
        config.gateway.host = "bad host!".to_string();
        config.gateway.public_base_url = "example.com".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "gateway.host"));
        assert!(has_message(&errors, "public_base_url"));
    }
}
