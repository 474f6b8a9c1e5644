// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plan reference data.

use meterbot_core::types::{NewPlan, Plan};
use meterbot_core::MeterError;
use rusqlite::{params, OptionalExtension, Row};

use crate::database::{map_tr_err, Database};

const PLAN_COLUMNS: &str = "plan_id, name, price, credits, description, created_at";

fn plan_from_row(row: &Row<'_>) -> rusqlite::Result<Plan> {
    Ok(Plan {
        plan_id: row.get(0)?,
        name: row.get(1)?,
        price: row.get(2)?,
        credits: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub async fn insert_plan(db: &Database, plan: &NewPlan) -> Result<i64, MeterError> {
    let plan = plan.clone();
    let now = super::now();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO plans (name, price, credits, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![plan.name, plan.price, plan.credits, plan.description, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_plan(db: &Database, plan_id: i64) -> Result<Option<Plan>, MeterError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {PLAN_COLUMNS} FROM plans WHERE plan_id = ?1"),
                params![plan_id],
                plan_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// All plans, cheapest first.
pub async fn list_plans(db: &Database) -> Result<Vec<Plan>, MeterError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PLAN_COLUMNS} FROM plans ORDER BY price ASC, plan_id ASC"
            ))?;
            let plans = stmt
                .query_map([], plan_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(plans)
        })
        .await
        .map_err(map_tr_err)
}
