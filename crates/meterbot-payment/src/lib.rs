// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment lifecycle for meterbot.
//!
//! A payment is created `pending`, handed to the provider for a redirect,
//! and settled exactly once by the provider's callback. See
//! [`PaymentCoordinator`] for the state machine.

pub mod coordinator;

pub use coordinator::{
    list_unreconciled, CallbackOutcome, CallbackParams, Checkout, CoordinatorSettings,
    PaymentCoordinator, Unreconciled, CREDITED_UNMARKED,
};
