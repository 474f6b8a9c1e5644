// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metering primitives for meterbot.
//!
//! - **Credit ledger**: balance reads, atomic conditional debits, credits, refunds
//! - **Answer cache**: `(normalized question, provider)` answers with a TTL
//! - **Rate limiter**: per-user minimum interval derived from question history
//!
//! All three are thin policies over an injected [`LedgerStore`].
//!
//! [`LedgerStore`]: meterbot_core::LedgerStore

pub mod cache;
pub mod credit;
pub mod rate_limit;

pub use cache::{normalize_question, AnswerCache};
pub use credit::CreditLedger;
pub use rate_limit::{RateDecision, RateLimiter};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use meterbot_config::model::StorageConfig;
    use meterbot_core::types::{Platform, User, UserKey};
    use meterbot_core::LedgerStore;
    use meterbot_storage::{Database, SqliteStorage};

    pub async fn store() -> Arc<dyn LedgerStore> {
        let db = Database::open_in_memory().await.unwrap();
        Arc::new(SqliteStorage::from_database(StorageConfig::default(), db))
    }

    pub async fn store_with_user(credits: i64) -> (Arc<dyn LedgerStore>, UserKey) {
        let store = store().await;
        let key = UserKey::new(Platform::Telegram, "1001");
        store
            .insert_user_if_absent(&User {
                user_key: key.clone(),
                platform_user_id: "1001".into(),
                origin: Platform::Telegram,
                username: None,
                phone_number: None,
                credits,
                created_at: "2026-01-01T00:00:00.000Z".into(),
            })
            .await
            .unwrap();
        (store, key)
    }
}
