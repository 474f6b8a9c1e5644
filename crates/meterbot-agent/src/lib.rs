// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request orchestration for meterbot.
//!
//! The [`Orchestrator`] composes the rate limiter, credit ledger, answer
//! cache and the injected [`AnswerProvider`] into the per-message flow:
//! - onboarding gate and on-the-fly registration
//! - rate limit, balance check, debit
//! - cache lookup, provider call under a timeout, refund on failure
//! - cache store and history record on success
//!
//! [`AnswerProvider`]: meterbot_core::AnswerProvider

pub mod orchestrator;
pub mod shutdown;

pub use orchestrator::{
    parse_plan_choice, ContactOutcome, Orchestrator, OrchestratorSettings, Outcome, PlanOption,
    TextEvent, PLAN_CHOICE_PREFIX,
};
pub use shutdown::install_signal_handler;
