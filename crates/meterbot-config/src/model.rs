// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model.
//!
//! Every section denies unknown fields so typos fail at startup instead of
//! being silently ignored.

use serde::{Deserialize, Serialize};

/// Top-level meterbot configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MeterConfig {
    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub zarinpal: ZarinpalConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP listener for payment callbacks.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Rate limiting and cache freshness.
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Bot identity and user onboarding.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Credits granted to a newly registered user.
    #[serde(default = "default_initial_credits")]
    pub initial_credits: i64,

    /// Whether a phone number must be shared before questions are answered.
    #[serde(default = "default_require_contact")]
    pub require_contact: bool,

    /// Currency label shown on the plan menu.
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            log_level: default_log_level(),
            initial_credits: default_initial_credits(),
            require_contact: default_require_contact(),
            currency: default_currency(),
        }
    }
}

fn default_bot_name() -> String {
    "meterbot".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_initial_credits() -> i64 {
    20
}

fn default_require_contact() -> bool {
    true
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
}

/// Gemini answer provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_gemini_model")]
    pub model: String,

    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Upper bound on one answer call, in seconds.
    #[serde(default = "default_gemini_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
            timeout_secs: default_gemini_timeout(),
        }
    }
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_timeout() -> u64 {
    60
}

/// ZarinPal payment provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ZarinpalConfig {
    #[serde(default)]
    pub merchant_id: Option<String>,

    /// Use the sandbox endpoints instead of production.
    #[serde(default)]
    pub sandbox: bool,

    #[serde(default = "default_zarinpal_timeout")]
    pub timeout_secs: u64,
}

impl Default for ZarinpalConfig {
    fn default() -> Self {
        Self {
            merchant_id: None,
            sandbox: false,
            timeout_secs: default_zarinpal_timeout(),
        }
    }
}

fn default_zarinpal_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("meterbot").join("meterbot.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("meterbot.db"))
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_enabled")]
    pub enabled: bool,

    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Externally reachable base URL used to build payment callback links.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: default_gateway_enabled(),
            host: default_gateway_host(),
            port: default_gateway_port(),
            public_base_url: default_public_base_url(),
        }
    }
}

fn default_gateway_enabled() -> bool {
    true
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    5000
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Minimum seconds between two questions from the same user.
    #[serde(default = "default_rate_limit_secs")]
    pub rate_limit_secs: u64,

    /// How long a cached answer stays fresh.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Interval of the expired-entry sweep. 0 disables it.
    #[serde(default = "default_cache_sweep_interval_secs")]
    pub cache_sweep_interval_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_limit_secs: default_rate_limit_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_sweep_interval_secs: default_cache_sweep_interval_secs(),
        }
    }
}

fn default_rate_limit_secs() -> u64 {
    10
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_sweep_interval_secs() -> u64 {
    600
}
