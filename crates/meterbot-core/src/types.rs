// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across adapter traits and the meterbot crates.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Storage format for every persisted timestamp.
///
/// Fixed width, UTC, millisecond precision: lexicographic order equals
/// chronological order, so SQL comparisons on the text column are valid.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Formats a UTC instant in [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a stored timestamp.
///
/// Accepts [`TIMESTAMP_FORMAT`], any RFC 3339 string, and offset-less ISO
/// 8601 (interpreted as UTC). Returns `None` for anything else.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Chat platform a user reached the bot from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum Platform {
    Telegram,
    Bale,
}

impl Platform {
    /// Numeric suffix used in the opaque user key.
    pub fn code(self) -> u8 {
        match self {
            Platform::Telegram => 0,
            Platform::Bale => 1,
        }
    }
}

/// Stable opaque user key, `"{platform_user_id}-{platform_code}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserKey(pub String);

impl UserKey {
    /// Derives the key for a platform-native user id.
    pub fn new(platform: Platform, platform_user_id: &str) -> Self {
        Self(format!("{platform_user_id}-{}", platform.code()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A bot user and their credit balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_key: UserKey,
    pub platform_user_id: String,
    pub origin: Platform,
    pub username: Option<String>,
    pub phone_number: Option<String>,
    pub credits: i64,
    pub created_at: String,
}

/// Identity data delivered by the chat transport on first contact.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub platform: Platform,
    pub platform_user_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

impl UserProfile {
    pub fn user_key(&self) -> UserKey {
        UserKey::new(self.platform, &self.platform_user_id)
    }
}

/// A purchasable credit plan. Reference data, written by the admin CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: i64,
    pub name: String,
    /// Price in the provider's integer currency unit.
    pub price: i64,
    /// Credits granted on completed payment. Always positive.
    pub credits: i64,
    pub description: Option<String>,
    pub created_at: String,
}

/// Input for creating a plan.
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub name: String,
    pub price: i64,
    pub credits: i64,
    pub description: Option<String>,
}

/// Payment lifecycle state.
///
/// `Pending` is the only non-terminal state; every other state is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    VerificationFailed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        self == PaymentStatus::Pending && next.is_terminal()
    }
}

/// A payment for one plan by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: i64,
    pub user_key: UserKey,
    pub plan_id: i64,
    pub amount: i64,
    pub status: PaymentStatus,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    pub authority: Option<String>,
    pub ref_id: Option<String>,
    /// Set once the plan's credit grant has been confirmed.
    pub credited_at: Option<String>,
}

/// Audit row for one verification outcome reported by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentTransaction {
    pub payment_id: i64,
    pub provider_status: String,
    pub ref_id: Option<String>,
    pub provider_message: Option<String>,
    pub created_at: String,
}

/// A cached answer for a normalized question and provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub question: String,
    pub provider: String,
    pub answer: String,
    pub created_at: String,
    pub expires_at: String,
}

/// Append-only record of an answered question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub user_key: UserKey,
    pub text: String,
    pub answer: String,
    pub requested_at: String,
    pub responded_at: String,
}

/// Result of an atomic conditional debit at the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    /// The debit was applied; carries the new balance.
    Applied { balance: i64 },
    /// The balance could not cover the debit; nothing changed.
    Insufficient,
    /// No user with that key exists.
    UnknownUser,
}

/// Request to start a payment with the provider.
#[derive(Debug, Clone)]
pub struct PaymentInitiation {
    pub amount: i64,
    pub description: String,
    pub callback_url: String,
}

/// Provider handle returned by a successful initiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentHandle {
    pub authority: String,
    pub redirect_url: String,
}

/// Provider confirmation of a verified payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub ref_id: String,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum AdapterType {
    Channel,
    Provider,
    Payment,
    Storage,
}
