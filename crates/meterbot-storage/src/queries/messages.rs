// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only question history.

use meterbot_core::types::{HistoryRecord, UserKey};
use meterbot_core::MeterError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};

pub async fn insert_history(db: &Database, record: &HistoryRecord) -> Result<(), MeterError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (user_key, text, answer, requested_at, responded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.user_key.as_str(),
                    record.text,
                    record.answer,
                    record.requested_at,
                    record.responded_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn last_request_timestamp(
    db: &Database,
    user_key: &UserKey,
) -> Result<Option<String>, MeterError> {
    let key = user_key.as_str().to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT requested_at FROM messages WHERE user_key = ?1
                 ORDER BY requested_at DESC, id DESC LIMIT 1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_history(
    db: &Database,
    user_key: &UserKey,
    limit: i64,
) -> Result<Vec<HistoryRecord>, MeterError> {
    let key = user_key.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_key, text, answer, requested_at, responded_at
                 FROM messages WHERE user_key = ?1
                 ORDER BY requested_at DESC, id DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![key, limit], |row| {
                    Ok(HistoryRecord {
                        user_key: UserKey(row.get(0)?),
                        text: row.get(1)?,
                        answer: row.get(2)?,
                        requested_at: row.get(3)?,
                        responded_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::db_with_user;

    fn record(key: &UserKey, text: &str, at: &str) -> HistoryRecord {
        HistoryRecord {
            user_key: key.clone(),
            text: text.to_string(),
            answer: "a".to_string(),
            requested_at: at.to_string(),
            responded_at: at.to_string(),
        }
    }

    #[tokio::test]
    async fn last_timestamp_is_latest_request() {
        let (db, key) = db_with_user("1", 0).await;
        assert!(last_request_timestamp(&db, &key).await.unwrap().is_none());

        insert_history(&db, &record(&key, "first", "2026-01-01T00:00:01.000Z")).await.unwrap();
        insert_history(&db, &record(&key, "second", "2026-01-01T00:00:09.000Z")).await.unwrap();

        assert_eq!(
            last_request_timestamp(&db, &key).await.unwrap().as_deref(),
            Some("2026-01-01T00:00:09.000Z")
        );
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let (db, key) = db_with_user("1", 0).await;
        for (i, at) in ["2026-01-01T00:00:01.000Z", "2026-01-01T00:00:02.000Z", "2026-01-01T00:00:03.000Z"]
            .iter()
            .enumerate()
        {
            insert_history(&db, &record(&key, &format!("q{i}"), at)).await.unwrap();
        }
        let texts: Vec<String> = list_history(&db, &key, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(texts, vec!["q2", "q1"]);
    }

    #[tokio::test]
    async fn history_for_unknown_user_violates_foreign_key() {
        let (db, _) = db_with_user("1", 0).await;
        let ghost = UserKey("ghost-0".to_string());
        assert!(insert_history(&db, &record(&ghost, "q", "2026-01-01T00:00:00.000Z"))
            .await
            .is_err());
    }
}
