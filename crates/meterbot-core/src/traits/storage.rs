// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ledger store trait: the record storage every component is injected with.

use async_trait::async_trait;

use crate::error::MeterError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    CacheEntry, DebitOutcome, HistoryRecord, NewPlan, Payment, PaymentStatus,
    PaymentTransaction, Plan, User, UserKey,
};

/// Durable key/record storage for users, plans, payments, cached answers and
/// message history.
///
/// Every mutation is a single-row atomic statement. No operation spans more
/// than one table, so callers must not assume cross-table transactions.
#[async_trait]
pub trait LedgerStore: PluginAdapter {
    /// Opens the backend and applies migrations.
    async fn initialize(&self) -> Result<(), MeterError>;

    /// Flushes pending writes and releases the backend.
    async fn close(&self) -> Result<(), MeterError>;

    // --- Users ---

    /// Inserts the user unless the key exists. Returns `true` if created.
    async fn insert_user_if_absent(&self, user: &User) -> Result<bool, MeterError>;

    async fn get_user(&self, user_key: &UserKey) -> Result<Option<User>, MeterError>;

    /// Stores a phone number. Returns `false` if the user does not exist.
    async fn set_phone_number(&self, user_key: &UserKey, phone: &str) -> Result<bool, MeterError>;

    /// Current balance, `None` if the user does not exist.
    async fn get_credits(&self, user_key: &UserKey) -> Result<Option<i64>, MeterError>;

    /// Atomic `credits = credits - amount WHERE credits >= amount`.
    async fn debit_credits(&self, user_key: &UserKey, amount: i64) -> Result<DebitOutcome, MeterError>;

    /// Atomic `credits = credits + amount`. Returns `false` if the user does not exist.
    async fn add_credits(&self, user_key: &UserKey, amount: i64) -> Result<bool, MeterError>;

    // --- Plans ---

    /// Inserts a plan and returns its id.
    async fn insert_plan(&self, plan: &NewPlan) -> Result<i64, MeterError>;

    async fn get_plan(&self, plan_id: i64) -> Result<Option<Plan>, MeterError>;

    async fn list_plans(&self) -> Result<Vec<Plan>, MeterError>;

    // --- Payments ---

    /// Inserts a `pending` payment and returns its id.
    async fn insert_payment(&self, user_key: &UserKey, plan_id: i64, amount: i64) -> Result<i64, MeterError>;

    async fn get_payment(&self, payment_id: i64) -> Result<Option<Payment>, MeterError>;

    /// Stores the provider authority on a `pending` payment.
    /// Returns `false` if the payment is missing or no longer pending.
    async fn set_payment_authority(&self, payment_id: i64, authority: &str) -> Result<bool, MeterError>;

    /// Compare-and-set `pending -> to`. Returns `true` only for the caller
    /// whose update moved the row out of `pending`.
    async fn transition_payment(
        &self,
        payment_id: i64,
        to: PaymentStatus,
        ref_id: Option<&str>,
    ) -> Result<bool, MeterError>;

    /// Sets `credited_at` once. Returns `false` if already set or missing.
    async fn mark_payment_credited(&self, payment_id: i64) -> Result<bool, MeterError>;

    /// `completed` payments whose credit grant was never confirmed.
    async fn list_unreconciled_payments(&self) -> Result<Vec<Payment>, MeterError>;

    async fn insert_payment_transaction(&self, tx: &PaymentTransaction) -> Result<(), MeterError>;

    async fn list_payment_transactions(&self, payment_id: i64) -> Result<Vec<PaymentTransaction>, MeterError>;

    // --- Answer cache ---

    /// Newest entry for `(question, provider)` whose `expires_at > now`.
    async fn get_cache_entry(
        &self,
        question: &str,
        provider: &str,
        now: &str,
    ) -> Result<Option<CacheEntry>, MeterError>;

    async fn insert_cache_entry(&self, entry: &CacheEntry) -> Result<(), MeterError>;

    /// Physically removes entries with `expires_at <= now`. Returns rows removed.
    async fn sweep_cache(&self, now: &str) -> Result<usize, MeterError>;

    /// Number of physical cache rows, expired or not.
    async fn count_cache_entries(&self) -> Result<i64, MeterError>;

    // --- Message history ---

    async fn insert_history(&self, record: &HistoryRecord) -> Result<(), MeterError>;

    /// `requested_at` of the user's most recent history record, verbatim.
    async fn last_request_timestamp(&self, user_key: &UserKey) -> Result<Option<String>, MeterError>;

    /// History for a user, newest first.
    async fn list_history(&self, user_key: &UserKey, limit: i64) -> Result<Vec<HistoryRecord>, MeterError>;
}
