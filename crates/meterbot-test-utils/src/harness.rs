// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the orchestrator and payment coordinator over a
//! temp SQLite database with mock provider, gateway and notifier.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use meterbot_agent::{Orchestrator, OrchestratorSettings, Outcome, TextEvent};
use meterbot_config::model::StorageConfig;
use meterbot_core::types::{HistoryRecord, NewPlan, Platform, UserProfile};
use meterbot_core::{AnswerProvider, LedgerStore, MeterError, Notifier, PaymentGateway, UserKey};
use meterbot_payment::{
    CallbackOutcome, CallbackParams, Checkout, CoordinatorSettings, PaymentCoordinator,
};
use meterbot_storage::SqliteStorage;

use crate::mock_notifier::MockNotifier;
use crate::mock_payment::MockPaymentGateway;
use crate::mock_provider::{MockProvider, MockReply};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    replies: Vec<MockReply>,
    settings: OrchestratorSettings,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            replies: Vec::new(),
            settings: OrchestratorSettings {
                require_contact: false,
                provider_timeout: Duration::from_secs(2),
                ..OrchestratorSettings::default()
            },
        }
    }

    /// Set scripted provider replies.
    pub fn with_replies(mut self, replies: Vec<MockReply>) -> Self {
        self.replies = replies;
        self
    }

    pub fn with_initial_credits(mut self, credits: i64) -> Self {
        self.settings.initial_credits = credits;
        self
    }

    /// Require a shared phone number before questions are answered.
    pub fn with_contact_gate(mut self) -> Self {
        self.settings.require_contact = true;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.settings.provider_timeout = timeout;
        self
    }

    /// Build the harness on a fresh temp-file database.
    pub async fn build(self) -> Result<TestHarness, MeterError> {
        let temp_dir = tempfile::TempDir::new().map_err(MeterError::storage)?;
        let db_path = temp_dir.path().join("meterbot-test.db");

        let storage = SqliteStorage::new(StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        });
        storage.initialize().await?;
        let store: Arc<dyn LedgerStore> = Arc::new(storage);

        let provider = Arc::new(MockProvider::with_replies(self.replies));
        let gateway = Arc::new(MockPaymentGateway::new());
        let notifier = Arc::new(MockNotifier::new());

        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&provider) as Arc<dyn AnswerProvider>,
            self.settings,
        );
        let coordinator = Arc::new(PaymentCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&gateway) as Arc<dyn PaymentGateway>,
            CoordinatorSettings {
                public_base_url: "http://127.0.0.1:5000".to_string(),
                provider_timeout: Duration::from_secs(2),
            },
        )
        .with_notifier(Arc::clone(&notifier) as Arc<dyn Notifier>));

        Ok(TestHarness {
            provider,
            gateway,
            notifier,
            store,
            orchestrator,
            coordinator,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete meterbot core over mocks and a temp database.
pub struct TestHarness {
    pub provider: Arc<MockProvider>,
    pub gateway: Arc<MockPaymentGateway>,
    pub notifier: Arc<MockNotifier>,
    pub store: Arc<dyn LedgerStore>,
    pub orchestrator: Orchestrator,
    pub coordinator: Arc<PaymentCoordinator>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn profile(user_id: &str) -> UserProfile {
        UserProfile {
            platform: Platform::Telegram,
            platform_user_id: user_id.to_string(),
            username: None,
            first_name: Some(format!("user{user_id}")),
        }
    }

    pub fn user_key(user_id: &str) -> UserKey {
        UserKey::new(Platform::Telegram, user_id)
    }

    /// Sends a question as Telegram user `user_id` at `at`.
    pub async fn ask_at(&self, user_id: &str, text: &str, at: DateTime<Utc>) -> Outcome {
        self.orchestrator
            .handle_text(&TextEvent {
                profile: Self::profile(user_id),
                text: text.to_string(),
                received_at: at,
            })
            .await
    }

    pub async fn ask(&self, user_id: &str, text: &str) -> Outcome {
        self.ask_at(user_id, text, Utc::now()).await
    }

    pub async fn balance(&self, user_id: &str) -> Result<Option<i64>, MeterError> {
        self.store.get_credits(&Self::user_key(user_id)).await
    }

    /// Registers `user_id` and sets their balance to exactly `credits`.
    pub async fn user_with_balance(&self, user_id: &str, credits: i64) -> Result<(), MeterError> {
        let user = self.orchestrator.register(&Self::profile(user_id)).await?;
        let delta = credits - user.credits;
        if delta > 0 {
            self.store.add_credits(&user.user_key, delta).await?;
        } else if delta < 0 {
            self.store.debit_credits(&user.user_key, -delta).await?;
        }
        Ok(())
    }

    pub async fn history(&self, user_id: &str) -> Result<Vec<HistoryRecord>, MeterError> {
        self.store.list_history(&Self::user_key(user_id), 100).await
    }

    pub async fn add_plan(&self, name: &str, price: i64, credits: i64) -> Result<i64, MeterError> {
        self.store
            .insert_plan(&NewPlan {
                name: name.to_string(),
                price,
                credits,
                description: None,
            })
            .await
    }

    pub async fn buy(&self, user_id: &str, plan_id: i64) -> Result<Checkout, MeterError> {
        self.coordinator
            .create(&Self::user_key(user_id), plan_id)
            .await
    }

    /// Delivers a provider callback the way the HTTP endpoint would.
    pub async fn callback(
        &self,
        payment_id: i64,
        status: &str,
        authority: &str,
    ) -> Result<CallbackOutcome, MeterError> {
        let owner = self
            .store
            .get_payment(payment_id)
            .await?
            .map(|p| p.user_key);
        self.coordinator
            .handle_callback(&CallbackParams {
                status: status.to_string(),
                authority: authority.to_string(),
                payment_id,
                user_key: owner,
            })
            .await
    }
}
