// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP endpoint receiving payment provider callbacks.
//!
//! The provider redirects the buyer's browser to
//! `GET /zarinpal_callback?Authority=..&Status=OK|NOK&payment_id=..&user_id=..`.
//! The handler hands the parameters to the [`PaymentCoordinator`] and
//! answers with a plain-text page describing the outcome.
//!
//! [`PaymentCoordinator`]: meterbot_payment::PaymentCoordinator

pub mod handlers;
pub mod server;

pub use server::{build_router, start_server, GatewayState, ServerConfig};
