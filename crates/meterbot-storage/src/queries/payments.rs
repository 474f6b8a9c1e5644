// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payments and their verification audit trail.
//!
//! Status changes are compare-and-set updates guarded by
//! `status = 'pending'`, so a terminal payment can never move again and only
//! one of several concurrent callbacks wins the transition.

use meterbot_core::types::{Payment, PaymentStatus, PaymentTransaction, UserKey};
use meterbot_core::MeterError;
use rusqlite::{params, OptionalExtension, Row};

use crate::database::{map_tr_err, Database};

const PAYMENT_COLUMNS: &str = "payment_id, user_key, plan_id, amount, status, created_at, \
     updated_at, completed_at, authority, ref_id, credited_at";

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    let status: String = row.get(4)?;
    let status = status.parse::<PaymentStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Payment {
        payment_id: row.get(0)?,
        user_key: UserKey(row.get(1)?),
        plan_id: row.get(2)?,
        amount: row.get(3)?,
        status,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        completed_at: row.get(7)?,
        authority: row.get(8)?,
        ref_id: row.get(9)?,
        credited_at: row.get(10)?,
    })
}

pub async fn insert_payment(
    db: &Database,
    user_key: &UserKey,
    plan_id: i64,
    amount: i64,
) -> Result<i64, MeterError> {
    let key = user_key.as_str().to_string();
    let now = super::now();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO payments (user_key, plan_id, amount, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4, ?4)",
                params![key, plan_id, amount, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_payment(db: &Database, payment_id: i64) -> Result<Option<Payment>, MeterError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_id = ?1"),
                params![payment_id],
                payment_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_authority(
    db: &Database,
    payment_id: i64,
    authority: &str,
) -> Result<bool, MeterError> {
    let authority = authority.to_string();
    let now = super::now();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE payments SET authority = ?2, updated_at = ?3
                 WHERE payment_id = ?1 AND status = 'pending'",
                params![payment_id, authority, now],
            )?;
            Ok(updated == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Moves a `pending` payment to `to`. `completed_at` is stamped for every
/// terminal state; `ref_id` is kept when `None` is passed.
pub async fn transition(
    db: &Database,
    payment_id: i64,
    to: PaymentStatus,
    ref_id: Option<&str>,
) -> Result<bool, MeterError> {
    if !PaymentStatus::Pending.can_transition_to(to) {
        return Err(MeterError::Internal(format!(
            "illegal payment transition pending -> {to}"
        )));
    }
    let status = to.to_string();
    let ref_id = ref_id.map(str::to_string);
    let now = super::now();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE payments
                 SET status = ?2, ref_id = COALESCE(?3, ref_id), updated_at = ?4, completed_at = ?4
                 WHERE payment_id = ?1 AND status = 'pending'",
                params![payment_id, status, ref_id, now],
            )?;
            Ok(updated == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn mark_credited(db: &Database, payment_id: i64) -> Result<bool, MeterError> {
    let now = super::now();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE payments SET credited_at = ?2, updated_at = ?2
                 WHERE payment_id = ?1 AND status = 'completed' AND credited_at IS NULL",
                params![payment_id, now],
            )?;
            Ok(updated == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_unreconciled(db: &Database) -> Result<Vec<Payment>, MeterError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PAYMENT_COLUMNS} FROM payments
                 WHERE status = 'completed' AND credited_at IS NULL
                 ORDER BY payment_id ASC"
            ))?;
            let payments = stmt
                .query_map([], payment_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(payments)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn insert_transaction(db: &Database, tx: &PaymentTransaction) -> Result<(), MeterError> {
    let tx = tx.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO payment_transactions
                 (payment_id, provider_status, ref_id, provider_message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    tx.payment_id,
                    tx.provider_status,
                    tx.ref_id,
                    tx.provider_message,
                    tx.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_transactions(
    db: &Database,
    payment_id: i64,
) -> Result<Vec<PaymentTransaction>, MeterError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT payment_id, provider_status, ref_id, provider_message, created_at
                 FROM payment_transactions WHERE payment_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![payment_id], |row| {
                    Ok(PaymentTransaction {
                        payment_id: row.get(0)?,
                        provider_status: row.get(1)?,
                        ref_id: row.get(2)?,
                        provider_message: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}
