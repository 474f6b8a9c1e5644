// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator commands: `plan add`, `plan list`, `payments unreconciled` and
//! `cache sweep`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use meterbot_config::MeterConfig;
use meterbot_core::types::NewPlan;
use meterbot_core::{LedgerStore, MeterError, Plan};
use meterbot_ledger::AnswerCache;
use meterbot_payment::{list_unreconciled, Unreconciled};
use meterbot_storage::SqliteStorage;
use tracing::info;

/// Arguments of `meterbot plan add`.
#[derive(Debug, Clone)]
pub struct PlanArgs {
    pub name: String,
    pub price: i64,
    pub credits: i64,
    pub description: Option<String>,
}

impl PlanArgs {
    fn validate(&self) -> Result<NewPlan, MeterError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(MeterError::Config("--name cannot be empty".into()));
        }
        if self.price < 0 {
            return Err(MeterError::Config(format!(
                "--price must not be negative, got {}",
                self.price
            )));
        }
        if self.credits <= 0 {
            return Err(MeterError::Config(format!(
                "--credits must be positive, got {}",
                self.credits
            )));
        }
        Ok(NewPlan {
            name: name.to_string(),
            price: self.price,
            credits: self.credits,
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        })
    }
}

async fn open_store(config: &MeterConfig) -> Result<Arc<dyn LedgerStore>, MeterError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    Ok(Arc::new(storage))
}

pub async fn run_plan_add(config: &MeterConfig, args: PlanArgs) -> Result<(), MeterError> {
    let store = open_store(config).await?;
    let plan_id = add_plan(store.as_ref(), &args).await?;
    println!("Added plan {plan_id}: {} ({} credits for {})", args.name.trim(), args.credits, args.price);
    store.close().await
}

pub async fn run_plan_list(config: &MeterConfig) -> Result<(), MeterError> {
    let store = open_store(config).await?;
    let plans = store.list_plans().await?;
    print!("{}", format_plans(&plans, &config.bot.currency));
    store.close().await
}

pub async fn run_payments_unreconciled(config: &MeterConfig) -> Result<(), MeterError> {
    let store = open_store(config).await?;
    let payments = list_unreconciled(store.as_ref()).await?;
    print!("{}", format_unreconciled(&payments));
    store.close().await
}

pub async fn run_cache_sweep(config: &MeterConfig) -> Result<(), MeterError> {
    let store = open_store(config).await?;
    let removed = sweep_cache(Arc::clone(&store), config.limits.cache_ttl_secs).await?;
    println!("Removed {removed} expired cache entries");
    store.close().await
}

async fn add_plan(store: &dyn LedgerStore, args: &PlanArgs) -> Result<i64, MeterError> {
    let plan = args.validate()?;
    let plan_id = store.insert_plan(&plan).await?;
    info!(plan_id, name = %plan.name, credits = plan.credits, price = plan.price, "plan added");
    Ok(plan_id)
}

async fn sweep_cache(store: Arc<dyn LedgerStore>, ttl_secs: u64) -> Result<usize, MeterError> {
    AnswerCache::new(store, Duration::from_secs(ttl_secs))
        .sweep(Utc::now())
        .await
}

fn format_plans(plans: &[Plan], currency: &str) -> String {
    if plans.is_empty() {
        return "No plans defined.\n".to_string();
    }
    let mut out = String::new();
    for plan in plans {
        out.push_str(&format!(
            "{:>4}  {:<20} {:>6} credits  {} {currency}",
            plan.plan_id, plan.name, plan.credits, plan.price
        ));
        if let Some(description) = &plan.description {
            out.push_str(&format!("  {description}"));
        }
        out.push('\n');
    }
    out
}

fn format_unreconciled(payments: &[Unreconciled]) -> String {
    if payments.is_empty() {
        return "All completed payments are credited.\n".to_string();
    }
    let mut out = format!("{} completed payment(s) without a confirmed credit grant:\n", payments.len());
    for entry in payments {
        let p = &entry.payment;
        let state = if entry.credited_but_unmarked {
            "credited but unmarked, do not grant again"
        } else {
            "credit grant never applied"
        };
        out.push_str(&format!(
            "  payment {} user {} plan {} amount {} ref {} completed {} ({state})\n",
            p.payment_id,
            p.user_key,
            p.plan_id,
            p.amount,
            p.ref_id.as_deref().unwrap_or("-"),
            p.completed_at.as_deref().unwrap_or("-"),
        ));
    }
    out
}
