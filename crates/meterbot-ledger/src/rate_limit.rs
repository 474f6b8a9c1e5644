// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user minimum interval between answered questions.
//!
//! The limiter only reads the newest history record; recording the new
//! request is the caller's job once the flow succeeds. Check and record are
//! not atomic, so a burst may occasionally slip through twice.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use meterbot_core::types::{parse_timestamp, UserKey};
use meterbot_core::LedgerStore;
use tracing::warn;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Deny { retry_after: Duration },
}

pub struct RateLimiter {
    store: Arc<dyn LedgerStore>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn LedgerStore>, window: Duration) -> Self {
        Self { store, window }
    }

    /// Decides whether `user_key` may ask again at `now`.
    ///
    /// Fails open: an unreadable history or an unparsable timestamp allows
    /// the request.
    pub async fn evaluate(&self, user_key: &UserKey, now: DateTime<Utc>) -> RateDecision {
        let last = match self.store.last_request_timestamp(user_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return RateDecision::Allow,
            Err(e) => {
                warn!(user_key = %user_key, error = %e, "rate limit lookup failed, allowing");
                return RateDecision::Allow;
            }
        };

        let Some(last) = parse_timestamp(&last) else {
            warn!(user_key = %user_key, timestamp = %last, "unparsable history timestamp, allowing");
            return RateDecision::Allow;
        };

        // A timestamp ahead of `now` counts as zero elapsed.
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        if elapsed < self.window {
            RateDecision::Deny {
                retry_after: self.window - elapsed,
            }
        } else {
            RateDecision::Allow
        }
    }

    pub async fn allow(&self, user_key: &UserKey, now: DateTime<Utc>) -> bool {
        self.evaluate(user_key, now).await == RateDecision::Allow
    }
}
