// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Answer cache rows. Expiry is enforced on read; sweeping is housekeeping.

use meterbot_core::types::CacheEntry;
use meterbot_core::MeterError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};

pub async fn get_fresh_entry(
    db: &Database,
    question: &str,
    provider: &str,
    now: &str,
) -> Result<Option<CacheEntry>, MeterError> {
    let (question, provider, now) = (question.to_string(), provider.to_string(), now.to_string());
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT question, provider, answer, created_at, expires_at
                 FROM cache_entries
                 WHERE question = ?1 AND provider = ?2 AND expires_at > ?3
                 ORDER BY expires_at DESC LIMIT 1",
                params![question, provider, now],
                |row| {
                    Ok(CacheEntry {
                        question: row.get(0)?,
                        provider: row.get(1)?,
                        answer: row.get(2)?,
                        created_at: row.get(3)?,
                        expires_at: row.get(4)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn insert_entry(db: &Database, entry: &CacheEntry) -> Result<(), MeterError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO cache_entries (question, provider, answer, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.question,
                    entry.provider,
                    entry.answer,
                    entry.created_at,
                    entry.expires_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_expired(db: &Database, now: &str) -> Result<usize, MeterError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| conn.execute("DELETE FROM cache_entries WHERE expires_at <= ?1", params![now]))
        .await
        .map_err(map_tr_err)
}

pub async fn count_entries(db: &Database) -> Result<i64, MeterError> {
    db.connection()
        .call(|conn| conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0)))
        .await
        .map_err(map_tr_err)
}
