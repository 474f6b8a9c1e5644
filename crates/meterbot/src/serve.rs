// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `meterbot serve` implementation.
//!
//! Wires storage, the Gemini provider, the ZarinPal gateway and the Telegram
//! transport into the orchestrator and payment coordinator, then runs the
//! Telegram dispatcher, the payment callback server and the cache sweeper
//! until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use meterbot_agent::{install_signal_handler, Orchestrator, OrchestratorSettings};
use meterbot_config::MeterConfig;
use meterbot_core::{
    AnswerProvider, HealthStatus, LedgerStore, MeterError, Notifier, PaymentGateway,
    PluginAdapter,
};
use meterbot_gateway::{start_server, GatewayState, ServerConfig};
use meterbot_gemini::GeminiProvider;
use meterbot_ledger::AnswerCache;
use meterbot_payment::{CoordinatorSettings, PaymentCoordinator};
use meterbot_storage::SqliteStorage;
use meterbot_telegram::{BotContext, TelegramChannel};
use meterbot_zarinpal::ZarinpalGateway;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs the bot until SIGINT/SIGTERM.
pub async fn run_serve(config: MeterConfig) -> Result<(), MeterError> {
    init_tracing(&config.bot.log_level);

    info!(name = %config.bot.name, "meterbot starting");

    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    let store: Arc<dyn LedgerStore> = Arc::new(storage);
    info!(path = %config.storage.database_path, "storage ready");

    let provider: Arc<dyn AnswerProvider> = Arc::new(GeminiProvider::new(&config.gemini)?);
    let gateway: Arc<dyn PaymentGateway> = Arc::new(ZarinpalGateway::new(&config.zarinpal)?);
    let channel = TelegramChannel::new(&config.telegram)?;

    log_health(provider.as_ref()).await;
    log_health(gateway.as_ref()).await;

    let coordinator = Arc::new(
        PaymentCoordinator::new(
            Arc::clone(&store),
            gateway,
            CoordinatorSettings {
                public_base_url: config.gateway.public_base_url.clone(),
                provider_timeout: Duration::from_secs(config.zarinpal.timeout_secs),
            },
        )
        .with_notifier(Arc::new(channel.notifier()) as Arc<dyn Notifier>),
    );

    report_unreconciled(&coordinator).await;

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        provider,
        OrchestratorSettings::from_config(&config),
    ));

    let cancel = install_signal_handler();

    let sweeper = match config.limits.cache_sweep_interval_secs {
        0 => {
            info!("cache sweeper disabled");
            None
        }
        secs => {
            let cache = AnswerCache::new(
                Arc::clone(&store),
                Duration::from_secs(config.limits.cache_ttl_secs),
            );
            let sweep_cancel = cancel.clone();
            info!(interval_secs = secs, "cache sweeper started");
            Some(tokio::spawn(async move {
                cache_sweeper(cache, Duration::from_secs(secs), sweep_cancel).await;
            }))
        }
    };

    let server = if config.gateway.enabled {
        let server_config = ServerConfig {
            host: config.gateway.host.clone(),
            port: config.gateway.port,
        };
        let state = GatewayState::new(Arc::clone(&coordinator));
        let server_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = start_server(&server_config, state, server_cancel.clone()).await {
                error!(error = %e, "callback server failed, shutting down");
                server_cancel.cancel();
            }
        }))
    } else {
        warn!("callback server disabled, payments will not be settled by this process");
        None
    };

    let ctx = Arc::new(BotContext {
        orchestrator,
        coordinator,
    });
    channel.run(ctx, cancel.clone()).await;

    // The dispatcher also returns on its own errors; make sure the rest stops too.
    cancel.cancel();

    for task in [server, sweeper].into_iter().flatten() {
        if let Err(e) = task.await {
            warn!(error = %e, "background task did not stop cleanly");
        }
    }

    if let Err(e) = store.close().await {
        warn!(error = %e, "storage close failed");
    }

    info!("meterbot serve shutdown complete");
    Ok(())
}

/// Periodically removes expired answers until `cancel` fires.
async fn cache_sweeper(cache: AnswerCache, every: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Skip the first immediate tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match cache.sweep(Utc::now()).await {
                    Ok(0) => debug!("cache sweep found nothing to remove"),
                    Ok(removed) => info!(removed, "expired cache entries removed"),
                    Err(e) => warn!(error = %e, "cache sweep failed (non-fatal)"),
                }
            }
            _ = cancel.cancelled() => {
                info!("cache sweeper shutting down");
                break;
            }
        }
    }
}

async fn log_health<A: PluginAdapter + ?Sized>(adapter: &A) {
    match adapter.health_check().await {
        Ok(HealthStatus::Healthy) => debug!(adapter = adapter.name(), "adapter healthy"),
        Ok(HealthStatus::Degraded(reason)) => {
            warn!(adapter = adapter.name(), reason = %reason, "adapter degraded")
        }
        Ok(HealthStatus::Unhealthy(reason)) => {
            warn!(adapter = adapter.name(), reason = %reason, "adapter unhealthy")
        }
        Err(e) => warn!(adapter = adapter.name(), error = %e, "adapter health check failed"),
    }
}

/// Surfaces completed payments whose credit grant was never confirmed.
async fn report_unreconciled(coordinator: &PaymentCoordinator) {
    match coordinator.unreconciled().await {
        Ok(payments) if payments.is_empty() => {}
        Ok(payments) => {
            for entry in &payments {
                let p = &entry.payment;
                if entry.credited_but_unmarked {
                    error!(
                        payment_id = p.payment_id,
                        user_key = %p.user_key,
                        amount = p.amount,
                        inconsistent = true,
                        "completed payment is credited but unmarked, do not grant again"
                    );
                } else {
                    error!(
                        payment_id = p.payment_id,
                        user_key = %p.user_key,
                        amount = p.amount,
                        inconsistent = true,
                        "completed payment was never credited"
                    );
                }
            }
            warn!(
                count = payments.len(),
                "unreconciled payments found, see `meterbot payments unreconciled`"
            );
        }
        Err(e) => warn!(error = %e, "could not list unreconciled payments"),
    }
}

/// Initialize the tracing subscriber with an env filter.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("meterbot={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterbot_config::model::StorageConfig;
    use meterbot_core::types::CacheEntry;
    use meterbot_storage::Database;

    async fn store() -> Arc<dyn LedgerStore> {
        let db = Database::open_in_memory().await.unwrap();
        Arc::new(SqliteStorage::from_database(StorageConfig::default(), db))
    }

    #[tokio::test]
    async fn cache_sweeper_stops_on_cancel() {
        let cache = AnswerCache::new(store().await, Duration::from_secs(300));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(cache_sweeper(cache, Duration::from_secs(3600), cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper should stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn cache_sweeper_removes_expired_entries() {
        let store = store().await;
        store
            .insert_cache_entry(&CacheEntry {
                question: "stale".into(),
                provider: "gemini".into(),
                answer: "a".into(),
                created_at: "2000-01-01T00:00:00.000Z".into(),
                expires_at: "2000-01-01T00:05:00.000Z".into(),
            })
            .await
            .unwrap();

        let cache = AnswerCache::new(Arc::clone(&store), Duration::from_secs(300));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(cache_sweeper(cache, Duration::from_millis(20), cancel.clone()));

        let mut remaining = 1;
        for _ in 0..100 {
            remaining = store.count_cache_entries().await.unwrap();
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(remaining, 0);
    }
}
