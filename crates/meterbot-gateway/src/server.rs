// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Callback server built on axum.

use std::sync::Arc;

use axum::{routing::get, Router};
use meterbot_core::MeterError;
use meterbot_payment::coordinator::CALLBACK_PATH;
use meterbot_payment::PaymentCoordinator;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub coordinator: Arc<PaymentCoordinator>,
    /// Process start time for uptime reporting.
    pub start_time: std::time::Instant,
}

impl GatewayState {
    pub fn new(coordinator: Arc<PaymentCoordinator>) -> Self {
        Self {
            coordinator,
            start_time: std::time::Instant::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Routes:
/// - GET /zarinpal_callback
/// - GET /health
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(handlers::payment_callback))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `host:port` and serves until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), MeterError> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| MeterError::Internal(format!("failed to bind callback server to {addr}: {e}")))?;

    info!("callback server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| MeterError::Internal(format!("callback server error: {e}")))?;

    info!("callback server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_debug() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
        };
        assert!(format!("{config:?}").contains("5000"));
    }

    #[tokio::test]
    async fn server_stops_on_cancel() {
        let harness = meterbot_test_utils::TestHarness::builder().build().await.unwrap();
        let state = GatewayState::new(harness.coordinator.clone());
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let cancel = CancellationToken::new();
        let server = tokio::spawn({
            let cancel = cancel.clone();
            async move { start_server(&config, state, cancel).await }
        });
        cancel.cancel();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
