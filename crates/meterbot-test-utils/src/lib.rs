// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for meterbot integration tests.
//!
//! Provides mock adapters and a test harness for fast, deterministic,
//! CI-runnable tests without Telegram, Gemini or ZarinPal.
//!
//! # Components
//!
//! - [`MockProvider`] - answer provider with a queue of scripted replies
//! - [`MockPaymentGateway`] - payment provider with scripted initiate/verify results
//! - [`MockNotifier`] - captures payment notifications
//! - [`TestHarness`] - SQLite-backed orchestrator and payment coordinator

pub mod harness;
pub mod mock_notifier;
pub mod mock_payment;
pub mod mock_provider;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_notifier::MockNotifier;
pub use mock_payment::MockPaymentGateway;
pub use mock_provider::{MockProvider, MockReply};
