// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The credit ledger.
//!
//! Debits are a single conditional update at the storage layer, so any
//! number of concurrent debits against one balance succeed at most
//! `balance` times and never drive it negative. A missing user and a zero
//! balance are distinct: the former is [`MeterError::NotFound`], the latter
//! `Ok(0)`.

use std::sync::Arc;

use meterbot_core::types::{DebitOutcome, UserKey};
use meterbot_core::{LedgerStore, MeterError};
use tracing::{debug, error, info};

pub struct CreditLedger {
    store: Arc<dyn LedgerStore>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn get_balance(&self, user_key: &UserKey) -> Result<i64, MeterError> {
        self.store
            .get_credits(user_key)
            .await?
            .ok_or_else(|| MeterError::not_found("user", user_key.as_str()))
    }

    /// Takes `amount` credits if the balance covers it. Returns the new balance.
    pub async fn debit(&self, user_key: &UserKey, amount: i64) -> Result<i64, MeterError> {
        ensure_positive(amount)?;
        match self.store.debit_credits(user_key, amount).await? {
            DebitOutcome::Applied { balance } => {
                debug!(user_key = %user_key, amount, balance, "credits debited");
                Ok(balance)
            }
            DebitOutcome::Insufficient => Err(MeterError::InsufficientCredit {
                user_key: user_key.to_string(),
            }),
            DebitOutcome::UnknownUser => Err(MeterError::not_found("user", user_key.as_str())),
        }
    }

    /// Unconditional additive credit, used for plan grants and refunds.
    pub async fn credit(&self, user_key: &UserKey, amount: i64) -> Result<(), MeterError> {
        ensure_positive(amount)?;
        if !self.store.add_credits(user_key, amount).await? {
            return Err(MeterError::not_found("user", user_key.as_str()));
        }
        info!(user_key = %user_key, amount, "credits granted");
        Ok(())
    }

    /// Compensates one debited credit after a failed answer.
    ///
    /// Issues exactly one `credit(user_key, 1)`. If that write fails the
    /// balance has drifted; the failure is logged as an inconsistency and
    /// returned as [`MeterError::Inconsistent`] without retrying.
    pub async fn refund(&self, user_key: &UserKey) -> Result<(), MeterError> {
        match self.credit(user_key, 1).await {
            Ok(()) => {
                info!(user_key = %user_key, "credit refunded");
                Ok(())
            }
            Err(e) => {
                error!(
                    user_key = %user_key,
                    inconsistent = true,
                    error = %e,
                    "refund failed, balance is short one credit"
                );
                Err(MeterError::Inconsistent {
                    message: format!("refund for {user_key} failed: {e}"),
                })
            }
        }
    }
}

fn ensure_positive(amount: i64) -> Result<(), MeterError> {
    if amount <= 0 {
        return Err(MeterError::Internal(format!(
            "credit amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{store, store_with_user};
    use proptest::prelude::*;

    #[tokio::test]
    async fn balance_of_unknown_user_is_not_found() {
        let ledger = CreditLedger::new(store().await);
        let err = ledger.get_balance(&UserKey("nope-0".into())).await.unwrap_err();
        assert!(matches!(err, MeterError::NotFound { entity: "user", .. }));
    }

    #[tokio::test]
    async fn zero_balance_is_a_value() {
        let (store, key) = store_with_user(0).await;
        let ledger = CreditLedger::new(store);
        assert_eq!(ledger.get_balance(&key).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn debit_fails_closed_at_zero() {
        let (store, key) = store_with_user(1).await;
        let ledger = CreditLedger::new(store);
        assert_eq!(ledger.debit(&key, 1).await.unwrap(), 0);
        let err = ledger.debit(&key, 1).await.unwrap_err();
        assert!(matches!(err, MeterError::InsufficientCredit { .. }));
        assert_eq!(ledger.get_balance(&key).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn debit_of_unknown_user_is_not_found() {
        let ledger = CreditLedger::new(store().await);
        let err = ledger.debit(&UserKey("ghost-0".into()), 1).await.unwrap_err();
        assert!(matches!(err, MeterError::NotFound { .. }));
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected() {
        let (store, key) = store_with_user(5).await;
        let ledger = CreditLedger::new(store);
        assert!(ledger.debit(&key, 0).await.is_err());
        assert!(ledger.credit(&key, -3).await.is_err());
        assert_eq!(ledger.get_balance(&key).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn refund_restores_one_credit() {
        let (store, key) = store_with_user(5).await;
        let ledger = CreditLedger::new(store);
        ledger.debit(&key, 1).await.unwrap();
        ledger.refund(&key).await.unwrap();
        assert_eq!(ledger.get_balance(&key).await.unwrap(), 5);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn failed_refund_is_reported_as_inconsistent() {
        let ledger = CreditLedger::new(store().await);
        let err = ledger.refund(&UserKey("ghost-0".into())).await.unwrap_err();
        assert!(matches!(err, MeterError::Inconsistent { .. }));
        assert!(logs_contain("inconsistent=true"));
    }

    #[tokio::test]
    async fn two_racing_debits_on_balance_one_succeed_once() {
        let (store, key) = store_with_user(1).await;
        let ledger = Arc::new(CreditLedger::new(store));
        let (a, b) = tokio::join!(ledger.debit(&key, 1), ledger.debit(&key, 1));
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(ledger.get_balance(&key).await.unwrap(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn concurrent_debits_never_overdraw(balance in 0i64..12, attempts in 1usize..30) {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();
            let (succeeded, final_balance) = rt.block_on(async {
                let (store, key) = store_with_user(balance).await;
                let ledger = Arc::new(CreditLedger::new(store));
                let handles: Vec<_> = (0..attempts)
                    .map(|_| {
                        let ledger = Arc::clone(&ledger);
                        let key = key.clone();
                        tokio::spawn(async move { ledger.debit(&key, 1).await })
                    })
                    .collect();
                let results = futures::future::join_all(handles).await;
                let succeeded = results
                    .into_iter()
                    .filter(|r| matches!(r, Ok(Ok(_))))
                    .count() as i64;
                (succeeded, ledger.get_balance(&key).await.unwrap())
            });

            prop_assert!(succeeded <= balance);
            prop_assert_eq!(succeeded, balance.min(attempts as i64));
            prop_assert_eq!(final_balance, balance - succeeded);
            prop_assert!(final_balance >= 0);
        }
    }
}
