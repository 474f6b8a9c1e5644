// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of [`LedgerStore`].

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use meterbot_config::model::StorageConfig;
use meterbot_core::types::{
    CacheEntry, DebitOutcome, HistoryRecord, NewPlan, PaymentTransaction,
};
use meterbot_core::{
    AdapterType, HealthStatus, LedgerStore, MeterError, Payment, PaymentStatus, Plan,
    PluginAdapter, User, UserKey,
};

use crate::database::{map_tr_err, Database};
use crate::queries;

/// SQLite-backed ledger store.
///
/// The database is opened by [`LedgerStore::initialize`]; every other call
/// fails with a storage error until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wraps an already opened database.
    pub fn from_database(config: StorageConfig, db: Database) -> Self {
        Self {
            config,
            db: OnceCell::new_with(Some(db)),
        }
    }

    fn db(&self) -> Result<&Database, MeterError> {
        self.db.get().ok_or_else(|| MeterError::Storage {
            source: "storage not initialized, call initialize() first".into(),
        })
    }

    async fn checkpoint(&self) -> Result<(), MeterError> {
        if let Some(db) = self.db.get() {
            db.connection()
                .call(|conn| -> Result<(), rusqlite::Error> {
                    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                    Ok(())
                })
                .await
                .map_err(map_tr_err)?;
            debug!("WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MeterError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MeterError> {
        self.checkpoint().await
    }
}

#[async_trait]
impl LedgerStore for SqliteStorage {
    async fn initialize(&self) -> Result<(), MeterError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| MeterError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), MeterError> {
        self.db()?;
        self.checkpoint().await
    }

    // --- Users ---

    async fn insert_user_if_absent(&self, user: &User) -> Result<bool, MeterError> {
        queries::users::insert_user_if_absent(self.db()?, user).await
    }

    async fn get_user(&self, user_key: &UserKey) -> Result<Option<User>, MeterError> {
        queries::users::get_user(self.db()?, user_key).await
    }

    async fn set_phone_number(&self, user_key: &UserKey, phone: &str) -> Result<bool, MeterError> {
        queries::users::set_phone_number(self.db()?, user_key, phone).await
    }

    async fn get_credits(&self, user_key: &UserKey) -> Result<Option<i64>, MeterError> {
        queries::users::get_credits(self.db()?, user_key).await
    }

    async fn debit_credits(&self, user_key: &UserKey, amount: i64) -> Result<DebitOutcome, MeterError> {
        queries::users::debit_credits(self.db()?, user_key, amount).await
    }

    async fn add_credits(&self, user_key: &UserKey, amount: i64) -> Result<bool, MeterError> {
        queries::users::add_credits(self.db()?, user_key, amount).await
    }

    // --- Plans ---

    async fn insert_plan(&self, plan: &NewPlan) -> Result<i64, MeterError> {
        queries::plans::insert_plan(self.db()?, plan).await
    }

    async fn get_plan(&self, plan_id: i64) -> Result<Option<Plan>, MeterError> {
        queries::plans::get_plan(self.db()?, plan_id).await
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, MeterError> {
        queries::plans::list_plans(self.db()?).await
    }

    // --- Payments ---

    async fn insert_payment(&self, user_key: &UserKey, plan_id: i64, amount: i64) -> Result<i64, MeterError> {
        queries::payments::insert_payment(self.db()?, user_key, plan_id, amount).await
    }

    async fn get_payment(&self, payment_id: i64) -> Result<Option<Payment>, MeterError> {
        queries::payments::get_payment(self.db()?, payment_id).await
    }

    async fn set_payment_authority(&self, payment_id: i64, authority: &str) -> Result<bool, MeterError> {
        queries::payments::set_authority(self.db()?, payment_id, authority).await
    }

    async fn transition_payment(
        &self,
        payment_id: i64,
        to: PaymentStatus,
        ref_id: Option<&str>,
    ) -> Result<bool, MeterError> {
        queries::payments::transition(self.db()?, payment_id, to, ref_id).await
    }

    async fn mark_payment_credited(&self, payment_id: i64) -> Result<bool, MeterError> {
        queries::payments::mark_credited(self.db()?, payment_id).await
    }

    async fn list_unreconciled_payments(&self) -> Result<Vec<Payment>, MeterError> {
        queries::payments::list_unreconciled(self.db()?).await
    }

    async fn insert_payment_transaction(&self, tx: &PaymentTransaction) -> Result<(), MeterError> {
        queries::payments::insert_transaction(self.db()?, tx).await
    }

    async fn list_payment_transactions(&self, payment_id: i64) -> Result<Vec<PaymentTransaction>, MeterError> {
        queries::payments::list_transactions(self.db()?, payment_id).await
    }

    // --- Answer cache ---

    async fn get_cache_entry(
        &self,
        question: &str,
        provider: &str,
        now: &str,
    ) -> Result<Option<CacheEntry>, MeterError> {
        queries::cache::get_fresh_entry(self.db()?, question, provider, now).await
    }

    async fn insert_cache_entry(&self, entry: &CacheEntry) -> Result<(), MeterError> {
        queries::cache::insert_entry(self.db()?, entry).await
    }

    async fn sweep_cache(&self, now: &str) -> Result<usize, MeterError> {
        queries::cache::delete_expired(self.db()?, now).await
    }

    async fn count_cache_entries(&self) -> Result<i64, MeterError> {
        queries::cache::count_entries(self.db()?).await
    }

    // --- Message history ---

    async fn insert_history(&self, record: &HistoryRecord) -> Result<(), MeterError> {
        queries::messages::insert_history(self.db()?, record).await
    }

    async fn last_request_timestamp(&self, user_key: &UserKey) -> Result<Option<String>, MeterError> {
        queries::messages::last_request_timestamp(self.db()?, user_key).await
    }

    async fn list_history(&self, user_key: &UserKey, limit: i64) -> Result<Vec<HistoryRecord>, MeterError> {
        queries::messages::list_history(self.db()?, user_key, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterbot_core::types::Platform;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn reports_adapter_identity() {
        let storage = SqliteStorage::new(make_config("unused.db"));
        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn calls_before_initialize_fail() {
        let storage = SqliteStorage::new(make_config("unused.db"));
        let err = storage
            .get_credits(&UserKey("1-0".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, MeterError::Storage { .. }));
    }

    #[tokio::test]
    async fn initialize_twice_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("twice.db");
        let storage = SqliteStorage::new(make_config(path.to_str().unwrap()));
        storage.initialize().await.unwrap();
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("persist.db");
        let key = UserKey::new(Platform::Telegram, "77");

        {
            let storage = SqliteStorage::new(make_config(path.to_str().unwrap()));
            storage.initialize().await.unwrap();
            let user = User {
                user_key: key.clone(),
                platform_user_id: "77".into(),
                origin: Platform::Telegram,
                username: None,
                phone_number: None,
                credits: 20,
                created_at: "2026-01-01T00:00:00.000Z".into(),
            };
            assert!(storage.insert_user_if_absent(&user).await.unwrap());
            storage.debit_credits(&key, 1).await.unwrap();
            storage.close().await.unwrap();
        }

        let storage = SqliteStorage::new(make_config(path.to_str().unwrap()));
        storage.initialize().await.unwrap();
        assert_eq!(storage.get_credits(&key).await.unwrap(), Some(19));
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
