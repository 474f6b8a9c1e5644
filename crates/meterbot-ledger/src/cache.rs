// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared answer cache keyed by normalized question and provider name.
//!
//! Expiry is lazy: a lookup only returns rows whose `expires_at` is strictly
//! after `now`. Expired rows linger until [`AnswerCache::sweep`] removes them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use meterbot_core::types::{format_timestamp, CacheEntry};
use meterbot_core::{LedgerStore, MeterError};
use tracing::{debug, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Trims the question and collapses internal whitespace runs to one space.
/// Case is preserved.
pub fn normalize_question(question: &str) -> String {
    question.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct AnswerCache {
    store: Arc<dyn LedgerStore>,
    ttl: Duration,
}

impl AnswerCache {
    pub fn new(store: Arc<dyn LedgerStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Fresh cached answer, if any. A storage error counts as a miss.
    pub async fn lookup(
        &self,
        question: &str,
        provider: &str,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let key = normalize_question(question);
        match self
            .store
            .get_cache_entry(&key, provider, &format_timestamp(now))
            .await
        {
            Ok(Some(entry)) => {
                debug!(provider, "answer cache hit");
                Some(entry.answer)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(provider, error = %e, "answer cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Stores an answer with the configured TTL.
    pub async fn store(
        &self,
        question: &str,
        provider: &str,
        answer: &str,
        now: DateTime<Utc>,
    ) -> Result<(), MeterError> {
        self.store_with_ttl(question, provider, answer, self.ttl, now)
            .await
    }

    pub async fn store_with_ttl(
        &self,
        question: &str,
        provider: &str,
        answer: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), MeterError> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| MeterError::Internal(format!("cache ttl {ttl:?} out of range")))?;
        let entry = CacheEntry {
            question: normalize_question(question),
            provider: provider.to_string(),
            answer: answer.to_string(),
            created_at: format_timestamp(now),
            expires_at: format_timestamp(expires_at),
        };
        self.store.insert_cache_entry(&entry).await?;
        debug!(provider, expires_at = %entry.expires_at, "answer cached");
        Ok(())
    }

    /// Physically deletes expired rows. Returns how many were removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, MeterError> {
        let removed = self.store.sweep_cache(&format_timestamp(now)).await?;
        if removed > 0 {
            debug!(removed, "expired cache entries swept");
        }
        Ok(removed)
    }
}
