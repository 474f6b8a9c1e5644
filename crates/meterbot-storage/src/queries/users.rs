// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Users and credit balances.

use meterbot_core::types::{DebitOutcome, Platform, User, UserKey};
use meterbot_core::MeterError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};

pub async fn insert_user_if_absent(db: &Database, user: &User) -> Result<bool, MeterError> {
    let user = user.clone();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO users
                 (user_key, platform_user_id, origin, username, phone_number, credits, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.user_key.as_str(),
                    user.platform_user_id,
                    user.origin.to_string(),
                    user.username,
                    user.phone_number,
                    user.credits,
                    user.created_at,
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_user(db: &Database, user_key: &UserKey) -> Result<Option<User>, MeterError> {
    let key = user_key.as_str().to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT user_key, platform_user_id, origin, username, phone_number, credits, created_at
                 FROM users WHERE user_key = ?1",
                params![key],
                |row| {
                    let origin: String = row.get(2)?;
                    Ok(User {
                        user_key: UserKey(row.get(0)?),
                        platform_user_id: row.get(1)?,
                        origin: origin.parse().unwrap_or(Platform::Telegram),
                        username: row.get(3)?,
                        phone_number: row.get(4)?,
                        credits: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_phone_number(
    db: &Database,
    user_key: &UserKey,
    phone: &str,
) -> Result<bool, MeterError> {
    let key = user_key.as_str().to_string();
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE users SET phone_number = ?2 WHERE user_key = ?1",
                params![key, phone],
            )?;
            Ok(updated == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_credits(db: &Database, user_key: &UserKey) -> Result<Option<i64>, MeterError> {
    let key = user_key.as_str().to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT credits FROM users WHERE user_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Conditional decrement. The `WHERE credits >= ?2` guard makes two racing
/// debits against the same balance serialize on the row.
pub async fn debit_credits(
    db: &Database,
    user_key: &UserKey,
    amount: i64,
) -> Result<DebitOutcome, MeterError> {
    let key = user_key.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let balance: Option<i64> = conn
                .query_row(
                    "UPDATE users SET credits = credits - ?2
                     WHERE user_key = ?1 AND credits >= ?2
                     RETURNING credits",
                    params![key, amount],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(balance) = balance {
                return Ok(DebitOutcome::Applied { balance });
            }

            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE user_key = ?1)",
                params![key],
                |row| row.get(0),
            )?;
            Ok(if exists {
                DebitOutcome::Insufficient
            } else {
                DebitOutcome::UnknownUser
            })
        })
        .await
        .map_err(map_tr_err)
}

pub async fn add_credits(db: &Database, user_key: &UserKey, amount: i64) -> Result<bool, MeterError> {
    let key = user_key.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE users SET credits = credits + ?2 WHERE user_key = ?1",
                params![key, amount],
            )?;
            Ok(updated == 1)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::db_with_user;

    #[tokio::test]
    async fn insert_is_idempotent_and_keeps_first_balance() {
        let (db, key) = db_with_user("42", 20).await;
        let mut again = get_user(&db, &key).await.unwrap().unwrap();
        again.credits = 999;
        assert!(!insert_user_if_absent(&db, &again).await.unwrap());
        assert_eq!(get_credits(&db, &key).await.unwrap(), Some(20));
    }

    #[tokio::test]
    async fn get_user_round_trips_fields() {
        let (db, key) = db_with_user("7", 3).await;
        let user = get_user(&db, &key).await.unwrap().unwrap();
        assert_eq!(user.user_key.as_str(), "7-0");
        assert_eq!(user.origin, Platform::Telegram);
        assert_eq!(user.username.as_deref(), Some("tester"));
        assert!(user.phone_number.is_none());
    }

    #[tokio::test]
    async fn missing_user_is_none_not_zero() {
        let (db, _) = db_with_user("1", 0).await;
        let ghost = UserKey("nobody-0".to_string());
        assert_eq!(get_credits(&db, &ghost).await.unwrap(), None);
        assert_eq!(get_credits(&db, &UserKey::new(Platform::Telegram, "1")).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn debit_distinguishes_outcomes() {
        let (db, key) = db_with_user("5", 1).await;
        assert_eq!(
            debit_credits(&db, &key, 1).await.unwrap(),
            DebitOutcome::Applied { balance: 0 }
        );
        assert_eq!(
            debit_credits(&db, &key, 1).await.unwrap(),
            DebitOutcome::Insufficient
        );
        assert_eq!(
            debit_credits(&db, &UserKey("x-0".into()), 1).await.unwrap(),
            DebitOutcome::UnknownUser
        );
        assert_eq!(get_credits(&db, &key).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn add_credits_and_phone_require_existing_user() {
        let (db, key) = db_with_user("9", 0).await;
        assert!(add_credits(&db, &key, 100).await.unwrap());
        assert_eq!(get_credits(&db, &key).await.unwrap(), Some(100));
        assert!(!add_credits(&db, &UserKey("x-0".into()), 1).await.unwrap());

        assert!(set_phone_number(&db, &key, "+989120000000").await.unwrap());
        let user = get_user(&db, &key).await.unwrap().unwrap();
        assert_eq!(user.phone_number.as_deref(), Some("+989120000000"));
        assert!(!set_phone_number(&db, &UserKey("x-0".into()), "1").await.unwrap());
    }
}
