// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request handlers for the callback server.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use meterbot_core::{MeterError, UserKey};
use meterbot_payment::{CallbackOutcome, CallbackParams};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::server::GatewayState;

/// Query string of a provider callback. Every field is optional so that a
/// malformed callback gets a plain-text 400 instead of axum's rejection.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(rename = "Authority")]
    pub authority: Option<String>,
    #[serde(rename = "Status")]
    pub status: Option<String>,
    pub payment_id: Option<String>,
    pub user_id: Option<String>,
}

impl CallbackQuery {
    fn into_params(self) -> Option<CallbackParams> {
        let payment_id = self.payment_id?.trim().parse().ok()?;
        Some(CallbackParams {
            status: self.status.unwrap_or_default(),
            authority: self.authority.unwrap_or_default(),
            payment_id,
            user_key: self.user_id.filter(|u| !u.is_empty()).map(UserKey),
        })
    }
}

/// GET /zarinpal_callback
pub async fn payment_callback(
    State(state): State<GatewayState>,
    Query(query): Query<CallbackQuery>,
) -> (StatusCode, String) {
    let Some(params) = query.into_params() else {
        warn!("callback without a valid payment_id");
        return (
            StatusCode::BAD_REQUEST,
            "Invalid payment callback.".to_string(),
        );
    };

    match state.coordinator.handle_callback(&params).await {
        Ok(outcome) => {
            let status = match outcome {
                CallbackOutcome::Rejected => StatusCode::BAD_REQUEST,
                _ => StatusCode::OK,
            };
            (status, outcome.page_text())
        }
        Err(MeterError::NotFound { .. }) => {
            (StatusCode::NOT_FOUND, "Payment not found.".to_string())
        }
        Err(MeterError::Inconsistent { message }) => {
            error!(payment_id = params.payment_id, %message, "payment completed but not credited");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Your payment was received but your credits could not be added. Support has been notified."
                    .to_string(),
            )
        }
        Err(e) => {
            error!(payment_id = params.payment_id, error = %e, "callback handling failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An error occurred while processing your payment. Please contact support."
                    .to_string(),
            )
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

/// GET /health
pub async fn health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use meterbot_test_utils::TestHarness;
    use tower::ServiceExt;

    use crate::server::{build_router, GatewayState};

    use super::*;

    async fn get(harness: &TestHarness, uri: &str) -> (StatusCode, String) {
        let app = build_router(GatewayState::new(harness.coordinator.clone()));
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn pending_payment(harness: &TestHarness) -> (i64, String) {
        harness.user_with_balance("77", 0).await.unwrap();
        let plan = harness.add_plan("Basic", 1000, 50).await.unwrap();
        let checkout = harness.buy("77", plan).await.unwrap();
        let authority = checkout.redirect_url.rsplit('/').next().unwrap().to_string();
        (checkout.payment_id, authority)
    }

    #[tokio::test]
    async fn successful_callback_credits_and_replays_are_noops() {
        let harness = TestHarness::builder().build().await.unwrap();
        let (payment_id, authority) = pending_payment(&harness).await;
        let uri = format!(
            "/zarinpal_callback?Authority={authority}&Status=OK&payment_id={payment_id}&user_id=77-0"
        );

        let (status, body) = get(&harness, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("Payment successful. 50 credits"), "got: {body}");
        assert_eq!(harness.balance("77").await.unwrap(), Some(50));

        let (status, body) = get(&harness, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "This payment has already been completed.");
        assert_eq!(harness.balance("77").await.unwrap(), Some(50));
    }

    #[tokio::test]
    async fn cancelled_callback_reports_cancellation() {
        let harness = TestHarness::builder().build().await.unwrap();
        let (payment_id, authority) = pending_payment(&harness).await;

        let (status, body) = get(
            &harness,
            &format!("/zarinpal_callback?Authority={authority}&Status=NOK&payment_id={payment_id}"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Payment was cancelled.");
        assert_eq!(harness.balance("77").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn forged_authority_is_rejected() {
        let harness = TestHarness::builder().build().await.unwrap();
        let (payment_id, _) = pending_payment(&harness).await;

        let (status, _) = get(
            &harness,
            &format!("/zarinpal_callback?Authority=FORGED&Status=OK&payment_id={payment_id}"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(harness.gateway.verifications().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_payment_is_not_found() {
        let harness = TestHarness::builder().build().await.unwrap();
        let (status, body) =
            get(&harness, "/zarinpal_callback?Authority=A&Status=OK&payment_id=999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Payment not found.");
    }

    #[tokio::test]
    async fn missing_or_garbled_payment_id_is_bad_request() {
        let harness = TestHarness::builder().build().await.unwrap();
        for uri in [
            "/zarinpal_callback?Authority=A&Status=OK",
            "/zarinpal_callback?Authority=A&Status=OK&payment_id=abc",
        ] {
            let (status, body) = get(&harness, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, "Invalid payment callback.");
        }
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let harness = TestHarness::builder().build().await.unwrap();
        let (status, body) = get(&harness, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "healthy");
    }
}
