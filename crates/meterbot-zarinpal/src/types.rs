// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ZarinPal v4 wire types.
//!
//! Every response is an envelope `{"data": ..., "errors": ...}` where the
//! side that does not apply is an empty JSON array instead of `null`.

use serde::{Deserialize, Serialize};

/// Provider code for a successful request or verification.
pub const CODE_SUCCESS: i64 = 100;

/// Provider code for a payment that was already verified earlier.
pub const CODE_ALREADY_VERIFIED: i64 = 101;

#[derive(Debug, Serialize)]
pub struct PaymentRequestBody<'a> {
    pub merchant_id: &'a str,
    pub amount: i64,
    pub description: &'a str,
    pub callback_url: &'a str,
}

#[derive(Debug, Serialize)]
pub struct VerifyRequestBody<'a> {
    pub merchant_id: &'a str,
    pub authority: &'a str,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "MaybeObject::empty")]
    pub data: MaybeObject<T>,
    #[serde(default = "MaybeObject::empty")]
    pub errors: MaybeObject<ProviderErrors>,
}

/// An object, or the empty array ZarinPal sends in its place.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MaybeObject<T> {
    Object(T),
    Empty(Vec<serde_json::Value>),
}

impl<T> MaybeObject<T> {
    fn empty() -> Self {
        MaybeObject::Empty(Vec::new())
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            MaybeObject::Object(v) => Some(v),
            MaybeObject::Empty(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequestData {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub authority: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyData {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub ref_id: Option<RefId>,
    #[serde(default)]
    pub card_pan: Option<String>,
}

/// Reference id; documented as an integer, tolerated as a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RefId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for RefId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefId::Number(n) => write!(f, "{n}"),
            RefId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderErrors {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for ProviderErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.code, self.message)
    }
}
