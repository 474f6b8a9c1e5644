// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment state machine.
//!
//! ```text
//! pending ──> completed | failed | cancelled | verification_failed
//! ```
//!
//! Every transition is a compare-and-set on `status = 'pending'`. The
//! callback that wins `pending -> completed` is the only one that grants the
//! plan's credits, so replays and concurrent duplicates cannot double-grant.
//! Amount and authority are always read back from the stored payment, never
//! taken from the callback.
//!
//! A grant whose `credited_at` mark cannot be written leaves a
//! [`CREDITED_UNMARKED`] audit row, so [`list_unreconciled`] can tell it
//! apart from a payment that was never credited.

use std::sync::Arc;
use std::time::Duration;

use meterbot_core::types::{format_timestamp, PaymentInitiation, PaymentTransaction, UserKey};
use meterbot_core::{
    LedgerStore, MeterError, Notifier, Payment, PaymentGateway, PaymentStatus,
};
use meterbot_ledger::CreditLedger;
use tracing::{debug, error, info, warn};

/// Route the provider redirects the buyer back to.
pub const CALLBACK_PATH: &str = "/zarinpal_callback";

/// Audit status for a payment whose credits were granted but whose
/// `credited_at` mark could not be written.
pub const CREDITED_UNMARKED: &str = "credited_unmarked";

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Externally reachable base URL of the callback listener.
    pub public_base_url: String,
    /// Upper bound on each provider call.
    pub provider_timeout: Duration,
}

/// Where to send the buyer after a payment was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub payment_id: i64,
    pub redirect_url: String,
}

/// Query parameters delivered by the provider's callback.
#[derive(Debug, Clone)]
pub struct CallbackParams {
    pub status: String,
    pub authority: String,
    pub payment_id: i64,
    /// Informational only; the stored owner is always credited.
    pub user_key: Option<UserKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Verified, completed and credited.
    Completed {
        user_key: UserKey,
        credits: i64,
        ref_id: String,
    },
    /// The payment was already terminal; nothing changed.
    AlreadySettled(PaymentStatus),
    Cancelled { user_key: UserKey },
    Failed { user_key: UserKey },
    VerificationFailed { user_key: UserKey, message: String },
    /// The callback authority does not match the one issued for this
    /// payment, or no authority was ever issued.
    Rejected,
}

/// A completed payment without a confirmed credit grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unreconciled {
    pub payment: Payment,
    /// Credits were granted; only the `credited_at` mark is missing.
    /// Such a payment must not be credited again.
    pub credited_but_unmarked: bool,
}

/// Completed payments whose `credited_at` mark is missing.
pub async fn list_unreconciled(store: &dyn LedgerStore) -> Result<Vec<Unreconciled>, MeterError> {
    let mut out = Vec::new();
    for payment in store.list_unreconciled_payments().await? {
        let credited_but_unmarked = store
            .list_payment_transactions(payment.payment_id)
            .await?
            .iter()
            .any(|tx| tx.provider_status == CREDITED_UNMARKED);
        out.push(Unreconciled {
            payment,
            credited_but_unmarked,
        });
    }
    Ok(out)
}

impl CallbackOutcome {
    /// Plain-text reply for the callback page.
    pub fn page_text(&self) -> String {
        match self {
            Self::Completed { credits, ref_id, .. } => format!(
                "Payment successful. {credits} credits were added to your account. Reference: {ref_id}"
            ),
            Self::AlreadySettled(PaymentStatus::Completed) => {
                "This payment has already been completed.".to_string()
            }
            Self::AlreadySettled(status) => format!("This payment is already {status}."),
            Self::Cancelled { .. } => "Payment was cancelled.".to_string(),
            Self::Failed { .. } => "Payment failed.".to_string(),
            Self::VerificationFailed { .. } => {
                "Payment verification failed. No credits were added.".to_string()
            }
            Self::Rejected => "Invalid payment callback.".to_string(),
        }
    }

    /// Owner and chat message for outcomes that settle a payment.
    pub fn user_notice(&self) -> Option<(&UserKey, String)> {
        match self {
            Self::Completed {
                user_key, credits, ..
            } => Some((
                user_key,
                format!("Your payment was successful. {credits} credits have been added to your balance."),
            )),
            Self::Cancelled { user_key } => {
                Some((user_key, "Your payment was cancelled.".to_string()))
            }
            Self::Failed { user_key } => Some((user_key, "Your payment failed.".to_string())),
            Self::VerificationFailed { user_key, .. } => Some((
                user_key,
                "We could not verify your payment. No credits were added.".to_string(),
            )),
            Self::AlreadySettled(_) | Self::Rejected => None,
        }
    }
}

pub struct PaymentCoordinator {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    ledger: CreditLedger,
    notifier: Option<Arc<dyn Notifier>>,
    settings: CoordinatorSettings,
}

impl PaymentCoordinator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            ledger: CreditLedger::new(Arc::clone(&store)),
            store,
            gateway,
            notifier: None,
            settings,
        }
    }

    /// Notifies payment owners once a callback settles their payment.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Creates a `pending` payment for `plan_id` and obtains a redirect URL.
    ///
    /// If the provider fails or times out the payment moves to `failed` and
    /// stays in storage.
    pub async fn create(&self, user_key: &UserKey, plan_id: i64) -> Result<Checkout, MeterError> {
        let plan = self
            .store
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| MeterError::not_found("plan", plan_id.to_string()))?;
        if self.store.get_user(user_key).await?.is_none() {
            return Err(MeterError::not_found("user", user_key.as_str()));
        }

        let payment_id = self
            .store
            .insert_payment(user_key, plan.plan_id, plan.price)
            .await?;
        info!(payment_id, user_key = %user_key, plan_id, amount = plan.price, "payment created");

        let request = PaymentInitiation {
            amount: plan.price,
            description: format!("Purchase of {} plan", plan.name),
            callback_url: self.callback_url(payment_id, user_key),
        };

        let initiated = match tokio::time::timeout(
            self.settings.provider_timeout,
            self.gateway.initiate(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MeterError::Timeout {
                duration: self.settings.provider_timeout,
            }),
        };

        let handle = match initiated {
            Ok(handle) => handle,
            Err(e) => {
                warn!(payment_id, error = %e, "payment initiation failed");
                self.store
                    .transition_payment(payment_id, PaymentStatus::Failed, None)
                    .await?;
                return Err(match e {
                    MeterError::UpstreamCallFailed { .. } => e,
                    other => MeterError::UpstreamCallFailed {
                        service: self.gateway.name().to_string(),
                        message: "payment initiation failed".to_string(),
                        source: Some(Box::new(other)),
                    },
                });
            }
        };

        if !self
            .store
            .set_payment_authority(payment_id, &handle.authority)
            .await?
        {
            return Err(MeterError::Internal(format!(
                "payment {payment_id} left pending before its authority was stored"
            )));
        }
        debug!(payment_id, authority = %handle.authority, "payment authority stored");

        Ok(Checkout {
            payment_id,
            redirect_url: handle.redirect_url,
        })
    }

    /// Settles a payment from a provider callback.
    ///
    /// Returns [`MeterError::NotFound`] for an unknown payment and
    /// [`MeterError::Inconsistent`] when the payment completed but its
    /// credit grant could not be confirmed.
    pub async fn handle_callback(
        &self,
        params: &CallbackParams,
    ) -> Result<CallbackOutcome, MeterError> {
        let payment = self
            .store
            .get_payment(params.payment_id)
            .await?
            .ok_or_else(|| MeterError::not_found("payment", params.payment_id.to_string()))?;

        if payment.status.is_terminal() {
            debug!(payment_id = payment.payment_id, status = %payment.status, "callback for settled payment ignored");
            return Ok(CallbackOutcome::AlreadySettled(payment.status));
        }

        if let Some(claimed) = &params.user_key
            && *claimed != payment.user_key
        {
            warn!(
                payment_id = payment.payment_id,
                claimed = %claimed,
                owner = %payment.user_key,
                "callback user does not match payment owner"
            );
        }

        let Some(authority) = self.authenticate(&payment, &params.authority) else {
            return Ok(CallbackOutcome::Rejected);
        };

        let outcome = match params.status.as_str() {
            "OK" => self.settle_paid(&payment, &authority).await?,
            "NOK" => {
                self.settle_unpaid(&payment, PaymentStatus::Cancelled)
                    .await?
            }
            other => {
                debug!(payment_id = payment.payment_id, status = other, "unexpected callback status");
                self.settle_unpaid(&payment, PaymentStatus::Failed).await?
            }
        };

        self.notify(&outcome).await;
        Ok(outcome)
    }

    /// Completed payments whose credit grant was never confirmed.
    pub async fn unreconciled(&self) -> Result<Vec<Unreconciled>, MeterError> {
        list_unreconciled(self.store.as_ref()).await
    }

    /// Returns the stored authority if the callback presents it.
    ///
    /// Applies to every status: a callback that cannot name the authority
    /// issued for this payment may neither complete nor close it.
    fn authenticate(&self, payment: &Payment, callback_authority: &str) -> Option<String> {
        match &payment.authority {
            Some(stored) if stored == callback_authority => Some(stored.clone()),
            Some(_) => {
                warn!(
                    payment_id = payment.payment_id,
                    "callback authority does not match stored authority, rejecting"
                );
                None
            }
            None => {
                warn!(
                    payment_id = payment.payment_id,
                    "callback for payment without a stored authority, rejecting"
                );
                None
            }
        }
    }

    async fn settle_paid(
        &self,
        payment: &Payment,
        authority: &str,
    ) -> Result<CallbackOutcome, MeterError> {
        let verified = match tokio::time::timeout(
            self.settings.provider_timeout,
            self.gateway.verify(authority, payment.amount),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MeterError::Timeout {
                duration: self.settings.provider_timeout,
            }),
        };

        let verification = match verified {
            Ok(v) => v,
            Err(e) => return self.settle_unverified(payment, e).await,
        };

        if !self
            .store
            .transition_payment(
                payment.payment_id,
                PaymentStatus::Completed,
                Some(&verification.ref_id),
            )
            .await?
        {
            return self.already_settled(payment.payment_id).await;
        }
        info!(payment_id = payment.payment_id, ref_id = %verification.ref_id, "payment completed");

        self.record_transaction(payment.payment_id, "verified", Some(&verification.ref_id), None)
            .await;

        let credits = self.grant(payment).await?;

        Ok(CallbackOutcome::Completed {
            user_key: payment.user_key.clone(),
            credits,
            ref_id: verification.ref_id,
        })
    }

    /// Credits the plan to the stored owner of a freshly completed payment.
    async fn grant(&self, payment: &Payment) -> Result<i64, MeterError> {
        let plan = match self.store.get_plan(payment.plan_id).await {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                return Err(self.inconsistent(payment, "plan no longer exists".to_string()));
            }
            Err(e) => return Err(self.inconsistent(payment, format!("plan lookup failed: {e}"))),
        };

        if let Err(e) = self.ledger.credit(&payment.user_key, plan.credits).await {
            return Err(self.inconsistent(payment, format!("credit grant failed: {e}")));
        }

        match self.store.mark_payment_credited(payment.payment_id).await {
            Ok(true) => {}
            Ok(false) => warn!(payment_id = payment.payment_id, "payment was already marked credited"),
            Err(e) => {
                error!(
                    payment_id = payment.payment_id,
                    user_key = %payment.user_key,
                    credits = plan.credits,
                    error = %e,
                    inconsistent = true,
                    "credits granted but payment left unmarked (credited but unmarked)"
                );
                self.record_transaction(
                    payment.payment_id,
                    CREDITED_UNMARKED,
                    None,
                    Some(&e.to_string()),
                )
                .await;
            }
        }
        Ok(plan.credits)
    }

    async fn settle_unverified(
        &self,
        payment: &Payment,
        err: MeterError,
    ) -> Result<CallbackOutcome, MeterError> {
        let message = match &err {
            MeterError::VerificationFailed { message } => message.clone(),
            other => other.to_string(),
        };

        if !self
            .store
            .transition_payment(payment.payment_id, PaymentStatus::VerificationFailed, None)
            .await?
        {
            return self.already_settled(payment.payment_id).await;
        }
        warn!(
            payment_id = payment.payment_id,
            user_key = %payment.user_key,
            provider_message = %message,
            "payment verification failed"
        );
        self.record_transaction(payment.payment_id, "rejected", None, Some(&message))
            .await;

        Ok(CallbackOutcome::VerificationFailed {
            user_key: payment.user_key.clone(),
            message,
        })
    }

    async fn settle_unpaid(
        &self,
        payment: &Payment,
        to: PaymentStatus,
    ) -> Result<CallbackOutcome, MeterError> {
        if !self
            .store
            .transition_payment(payment.payment_id, to, None)
            .await?
        {
            return self.already_settled(payment.payment_id).await;
        }
        info!(payment_id = payment.payment_id, status = %to, "payment closed without charge");
        let user_key = payment.user_key.clone();
        Ok(match to {
            PaymentStatus::Cancelled => CallbackOutcome::Cancelled { user_key },
            _ => CallbackOutcome::Failed { user_key },
        })
    }

    /// Outcome for a caller that lost the compare-and-set.
    async fn already_settled(&self, payment_id: i64) -> Result<CallbackOutcome, MeterError> {
        let status = self
            .store
            .get_payment(payment_id)
            .await?
            .map(|p| p.status)
            .ok_or_else(|| MeterError::not_found("payment", payment_id.to_string()))?;
        debug!(payment_id, status = %status, "lost settlement race");
        Ok(CallbackOutcome::AlreadySettled(status))
    }

    async fn record_transaction(
        &self,
        payment_id: i64,
        provider_status: &str,
        ref_id: Option<&str>,
        message: Option<&str>,
    ) {
        let tx = PaymentTransaction {
            payment_id,
            provider_status: provider_status.to_string(),
            ref_id: ref_id.map(str::to_string),
            provider_message: message.map(str::to_string),
            created_at: format_timestamp(chrono::Utc::now()),
        };
        if let Err(e) = self.store.insert_payment_transaction(&tx).await {
            warn!(payment_id, error = %e, "payment transaction audit row not written");
        }
    }

    fn inconsistent(&self, payment: &Payment, message: String) -> MeterError {
        error!(
            payment_id = payment.payment_id,
            user_key = %payment.user_key,
            plan_id = payment.plan_id,
            inconsistent = true,
            "{message}"
        );
        MeterError::Inconsistent {
            message: format!("payment {} completed but {message}", payment.payment_id),
        }
    }

    async fn notify(&self, outcome: &CallbackOutcome) {
        let (Some(notifier), Some((user_key, text))) = (&self.notifier, outcome.user_notice())
        else {
            return;
        };
        if let Err(e) = notifier.notify(user_key, &text).await {
            warn!(user_key = %user_key, error = %e, "payment notification not delivered");
        }
    }

    fn callback_url(&self, payment_id: i64, user_key: &UserKey) -> String {
        format!(
            "{}{CALLBACK_PATH}?payment_id={payment_id}&user_id={user_key}",
            self.settings.public_base_url.trim_end_matches('/')
        )
    }
}
