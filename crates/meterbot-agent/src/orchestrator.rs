// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-message flow from an inbound question to exactly one reply.
//!
//! Side effects are strictly ordered: the credit is debited before the
//! provider call, refunded only after a confirmed failure, and the answer is
//! cached and recorded in history only after a confirmed success.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use meterbot_config::MeterConfig;
use meterbot_core::types::{format_timestamp, HistoryRecord, UserProfile};
use meterbot_core::{AnswerProvider, LedgerStore, MeterError, User, UserKey};
use meterbot_ledger::{AnswerCache, CreditLedger, RateDecision, RateLimiter};
use tracing::{debug, error, info, warn};

/// Prefix of the opaque plan-menu option value.
pub const PLAN_CHOICE_PREFIX: &str = "buy_plan_";

/// Tunables for the per-message flow.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub bot_name: String,
    pub initial_credits: i64,
    pub require_contact: bool,
    pub currency: String,
    pub rate_limit_window: Duration,
    pub cache_ttl: Duration,
    pub provider_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &MeterConfig) -> Self {
        Self {
            bot_name: config.bot.name.clone(),
            initial_credits: config.bot.initial_credits,
            require_contact: config.bot.require_contact,
            currency: config.bot.currency.clone(),
            rate_limit_window: Duration::from_secs(config.limits.rate_limit_secs),
            cache_ttl: Duration::from_secs(config.limits.cache_ttl_secs),
            provider_timeout: Duration::from_secs(config.gemini.timeout_secs),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&MeterConfig::default())
    }
}

/// An inbound text message.
#[derive(Debug, Clone)]
pub struct TextEvent {
    pub profile: UserProfile,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// Result of one question. Each variant maps to exactly one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Answered { text: String, cached: bool },
    /// Onboarding is incomplete: no phone number on file.
    ContactRequired,
    RateLimited { retry_after: Duration },
    OutOfCredit,
    /// The provider failed after the debit. `refunded` is false when the
    /// compensating credit could not be written.
    UpstreamFailed { refunded: bool },
    /// Storage could not be read or written; nothing was answered.
    Unavailable,
}

impl Outcome {
    pub fn reply_text(&self) -> String {
        match self {
            Outcome::Answered { text, .. } => text.clone(),
            Outcome::ContactRequired => {
                "Please share your phone number using the button below before asking questions."
                    .to_string()
            }
            Outcome::RateLimited { retry_after } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                format!("Please wait {} seconds before sending another question.", secs.max(1))
            }
            Outcome::OutOfCredit => {
                "You have run out of credits. Please purchase a plan with /buyplan to continue."
                    .to_string()
            }
            Outcome::UpstreamFailed { refunded: true } => {
                "Sorry, I could not get a response from the AI. Your credit has been refunded."
                    .to_string()
            }
            Outcome::UpstreamFailed { refunded: false } => {
                "Sorry, I could not get a response from the AI, and refunding your credit failed. Support has been notified."
                    .to_string()
            }
            Outcome::Unavailable => "Sorry, an error occurred. Please try again later.".to_string(),
        }
    }
}

/// Result of sharing a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactOutcome {
    Saved,
    /// The shared contact belongs to someone else.
    NotOwnContact,
}

impl ContactOutcome {
    pub fn reply_text(&self) -> &'static str {
        match self {
            ContactOutcome::Saved => "Thank you! Your phone number has been saved. Ask me anything!",
            ContactOutcome::NotOwnContact => "Please share your own contact.",
        }
    }
}

/// One entry of the plan purchase menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOption {
    pub label: String,
    pub value: String,
}

/// Parses a plan-menu option value back into its plan id.
pub fn parse_plan_choice(value: &str) -> Option<i64> {
    value.strip_prefix(PLAN_CHOICE_PREFIX)?.parse().ok()
}

pub struct Orchestrator {
    store: Arc<dyn LedgerStore>,
    provider: Arc<dyn AnswerProvider>,
    ledger: CreditLedger,
    cache: AnswerCache,
    limiter: RateLimiter,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        provider: Arc<dyn AnswerProvider>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            ledger: CreditLedger::new(Arc::clone(&store)),
            cache: AnswerCache::new(Arc::clone(&store), settings.cache_ttl),
            limiter: RateLimiter::new(Arc::clone(&store), settings.rate_limit_window),
            store,
            provider,
            settings,
        }
    }

    /// Creates the user if absent and returns the stored record.
    pub async fn register(&self, profile: &UserProfile) -> Result<User, MeterError> {
        let user_key = profile.user_key();
        let candidate = User {
            user_key: user_key.clone(),
            platform_user_id: profile.platform_user_id.clone(),
            origin: profile.platform,
            username: profile.username.clone(),
            phone_number: None,
            credits: self.settings.initial_credits,
            created_at: format_timestamp(Utc::now()),
        };
        if self.store.insert_user_if_absent(&candidate).await? {
            info!(
                user_key = %user_key,
                credits = self.settings.initial_credits,
                "user registered"
            );
        }
        self.store
            .get_user(&user_key)
            .await?
            .ok_or_else(|| MeterError::not_found("user", user_key.as_str()))
    }

    /// Greeting for `/start`, asking for a contact when onboarding is open.
    pub fn greeting(&self, profile: &UserProfile, user: &User) -> String {
        let name = profile.first_name.as_deref().unwrap_or("there");
        let mut text = format!(
            "Hello {name}! I am {}. Ask me anything!\nYou have {} credits.",
            self.settings.bot_name, user.credits
        );
        if self.contact_missing(user) {
            text.push_str("\nPlease share your phone number to get started.");
        }
        text
    }

    /// Whether `user` still has to share a contact before asking.
    pub fn contact_missing(&self, user: &User) -> bool {
        self.settings.require_contact && user.phone_number.is_none()
    }

    /// Stores a shared phone number. Only the sender's own contact is accepted.
    pub async fn record_contact(
        &self,
        profile: &UserProfile,
        contact_user_id: Option<&str>,
        phone_number: &str,
    ) -> Result<ContactOutcome, MeterError> {
        if contact_user_id != Some(profile.platform_user_id.as_str()) {
            debug!(user_id = %profile.platform_user_id, "foreign contact ignored");
            return Ok(ContactOutcome::NotOwnContact);
        }
        let user = self.register(profile).await?;
        if !self
            .store
            .set_phone_number(&user.user_key, phone_number)
            .await?
        {
            return Err(MeterError::not_found("user", user.user_key.as_str()));
        }
        info!(user_key = %user.user_key, "phone number recorded");
        Ok(ContactOutcome::Saved)
    }

    /// One option per plan, cheapest first.
    pub async fn plan_menu(&self) -> Result<Vec<PlanOption>, MeterError> {
        let plans = self.store.list_plans().await?;
        Ok(plans
            .into_iter()
            .map(|plan| PlanOption {
                label: format!(
                    "{} - {} {} - {} credits",
                    plan.name, plan.price, self.settings.currency, plan.credits
                ),
                value: format!("{PLAN_CHOICE_PREFIX}{}", plan.plan_id),
            })
            .collect())
    }

    pub fn help_text(&self) -> String {
        format!(
            "Welcome to {}!\n\n\
             I answer your questions using AI. Each answered question costs one credit.\n\n\
             Available commands:\n\
             /start - Start interacting with the bot.\n\
             /help - Show this help message.\n\
             /buyplan - View available plans to get more credits.\n\n\
             Send me any question, and I will do my best to answer it!",
            self.settings.bot_name
        )
    }

    /// Runs the full question flow and returns the single outcome to reply with.
    pub async fn handle_text(&self, event: &TextEvent) -> Outcome {
        let user = match self.register(&event.profile).await {
            Ok(user) => user,
            Err(e) => {
                error!(error = %e, "failed to load user");
                return Outcome::Unavailable;
            }
        };
        let user_key = user.user_key.clone();

        if self.contact_missing(&user) {
            return Outcome::ContactRequired;
        }

        if let RateDecision::Deny { retry_after } =
            self.limiter.evaluate(&user_key, event.received_at).await
        {
            debug!(user_key = %user_key, ?retry_after, "question rate limited");
            return Outcome::RateLimited { retry_after };
        }

        match self.ledger.get_balance(&user_key).await {
            Ok(balance) if balance <= 0 => return Outcome::OutOfCredit,
            Ok(_) => {}
            Err(e) => {
                error!(user_key = %user_key, error = %e, "balance read failed");
                return Outcome::Unavailable;
            }
        }

        match self.ledger.debit(&user_key, 1).await {
            Ok(_) => {}
            Err(MeterError::InsufficientCredit { .. }) => return Outcome::OutOfCredit,
            Err(e) => {
                error!(user_key = %user_key, error = %e, "debit failed");
                return Outcome::Unavailable;
            }
        }

        let provider = self.provider.name();
        if let Some(answer) = self
            .cache
            .lookup(&event.text, provider, event.received_at)
            .await
        {
            self.record_history(&user_key, event, &answer).await;
            return Outcome::Answered {
                text: answer,
                cached: true,
            };
        }

        let answer = match self.ask_provider(&event.text).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(user_key = %user_key, provider, error = %e, "answer provider failed, refunding");
                let refunded = self.ledger.refund(&user_key).await.is_ok();
                return Outcome::UpstreamFailed { refunded };
            }
        };

        if let Err(e) = self
            .cache
            .store(&event.text, provider, &answer, event.received_at)
            .await
        {
            warn!(provider, error = %e, "failed to cache answer");
        }
        self.record_history(&user_key, event, &answer).await;

        Outcome::Answered {
            text: answer,
            cached: false,
        }
    }

    async fn ask_provider(&self, question: &str) -> Result<String, MeterError> {
        let timeout = self.settings.provider_timeout;
        match tokio::time::timeout(timeout, self.provider.answer(question)).await {
            Ok(result) => result,
            Err(_) => Err(MeterError::Timeout { duration: timeout }),
        }
    }

    async fn record_history(&self, user_key: &UserKey, event: &TextEvent, answer: &str) {
        let record = HistoryRecord {
            user_key: user_key.clone(),
            text: event.text.clone(),
            answer: answer.to_string(),
            requested_at: format_timestamp(event.received_at),
            responded_at: format_timestamp(Utc::now()),
        };
        // The answer is already paid for; a lost history row only loosens rate limiting.
        if let Err(e) = self.store.insert_history(&record).await {
            warn!(user_key = %user_key, error = %e, "failed to record history");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;
    use meterbot_config::model::StorageConfig;
    use meterbot_core::types::{AdapterType, HealthStatus, NewPlan, Platform};
    use meterbot_core::PluginAdapter;
    use meterbot_storage::{Database, SqliteStorage};

    use super::*;

    enum Script {
        Answer(String),
        Fail,
        Hang,
    }

    struct ScriptedProvider {
        script: Script,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PluginAdapter for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Provider
        }
        async fn health_check(&self) -> Result<HealthStatus, MeterError> {
            Ok(HealthStatus::Healthy)
        }
        async fn shutdown(&self) -> Result<(), MeterError> {
            Ok(())
        }
    }

    #[async_trait]
    impl AnswerProvider for ScriptedProvider {
        async fn answer(&self, _prompt: &str) -> Result<String, MeterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Answer(text) => Ok(text.clone()),
                Script::Fail => Err(MeterError::upstream("scripted", "boom")),
                Script::Hang => std::future::pending().await,
            }
        }
    }

    fn profile() -> UserProfile {
        UserProfile {
            platform: Platform::Telegram,
            platform_user_id: "555".into(),
            username: Some("asker".into()),
            first_name: Some("Ada".into()),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn question(text: &str, secs: i64) -> TextEvent {
        TextEvent {
            profile: profile(),
            text: text.into(),
            received_at: at(secs),
        }
    }

    fn settings(require_contact: bool) -> OrchestratorSettings {
        OrchestratorSettings {
            require_contact,
            provider_timeout: Duration::from_millis(200),
            ..OrchestratorSettings::default()
        }
    }

    async fn setup(
        script: Script,
        require_contact: bool,
    ) -> (Orchestrator, Arc<dyn LedgerStore>, Arc<ScriptedProvider>) {
        let db = Database::open_in_memory().await.unwrap();
        let store: Arc<dyn LedgerStore> =
            Arc::new(SqliteStorage::from_database(StorageConfig::default(), db));
        let provider = ScriptedProvider::new(script);
        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&provider) as Arc<dyn AnswerProvider>,
            settings(require_contact),
        );
        (orchestrator, store, provider)
    }

    fn key() -> UserKey {
        UserKey::new(Platform::Telegram, "555")
    }

    #[tokio::test]
    async fn first_question_registers_debits_caches_and_records() {
        let (orch, store, provider) = setup(Script::Answer("Paris".into()), false).await;

        let outcome = orch.handle_text(&question("Capital of  France?", 0)).await;
        assert_eq!(
            outcome,
            Outcome::Answered {
                text: "Paris".into(),
                cached: false
            }
        );
        assert_eq!(provider.calls(), 1);
        assert_eq!(store.get_credits(&key()).await.unwrap(), Some(19));
        assert_eq!(store.list_history(&key(), 10).await.unwrap().len(), 1);
        assert_eq!(store.count_cache_entries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cache_hit_skips_provider_but_still_costs_a_credit() {
        let (orch, store, provider) = setup(Script::Answer("Paris".into()), false).await;

        orch.handle_text(&question("Capital of France?", 0)).await;
        let second = orch
            .handle_text(&question("  Capital of   France? ", 20))
            .await;

        assert_eq!(
            second,
            Outcome::Answered {
                text: "Paris".into(),
                cached: true
            }
        );
        assert_eq!(provider.calls(), 1);
        assert_eq!(store.get_credits(&key()).await.unwrap(), Some(18));
    }

    #[tokio::test]
    async fn contact_gate_blocks_without_side_effects() {
        let (orch, store, provider) = setup(Script::Answer("x".into()), true).await;

        let outcome = orch.handle_text(&question("hi", 0)).await;
        assert_eq!(outcome, Outcome::ContactRequired);
        assert_eq!(provider.calls(), 0);
        assert_eq!(store.get_credits(&key()).await.unwrap(), Some(20));

        let saved = orch
            .record_contact(&profile(), Some("555"), "+989120000000")
            .await
            .unwrap();
        assert_eq!(saved, ContactOutcome::Saved);
        assert!(matches!(
            orch.handle_text(&question("hi", 1)).await,
            Outcome::Answered { .. }
        ));
    }

    #[tokio::test]
    async fn foreign_contact_is_refused() {
        let (orch, store, _) = setup(Script::Answer("x".into()), true).await;
        let outcome = orch
            .record_contact(&profile(), Some("999"), "+1555")
            .await
            .unwrap();
        assert_eq!(outcome, ContactOutcome::NotOwnContact);
        assert!(store.get_user(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_question_within_window_is_rate_limited() {
        let (orch, store, provider) = setup(Script::Answer("a".into()), false).await;

        orch.handle_text(&question("one", 0)).await;
        let outcome = orch.handle_text(&question("two", 3)).await;

        assert_eq!(
            outcome,
            Outcome::RateLimited {
                retry_after: Duration::from_secs(7)
            }
        );
        assert_eq!(outcome.reply_text(), "Please wait 7 seconds before sending another question.");
        assert_eq!(provider.calls(), 1);
        assert_eq!(store.get_credits(&key()).await.unwrap(), Some(19));
        assert_eq!(store.list_history(&key(), 10).await.unwrap().len(), 1);

        assert!(matches!(
            orch.handle_text(&question("three", 11)).await,
            Outcome::Answered { .. }
        ));
    }

    #[tokio::test]
    async fn zero_balance_is_out_of_credit() {
        let (orch, store, provider) = setup(Script::Answer("a".into()), false).await;
        orch.register(&profile()).await.unwrap();
        store.debit_credits(&key(), 20).await.unwrap();

        let outcome = orch.handle_text(&question("q", 0)).await;
        assert_eq!(outcome, Outcome::OutOfCredit);
        assert_eq!(provider.calls(), 0);
        assert_eq!(store.get_credits(&key()).await.unwrap(), Some(0));
        assert!(store.list_history(&key(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn provider_failure_refunds_and_writes_nothing() {
        let (orch, store, _) = setup(Script::Fail, false).await;

        let outcome = orch.handle_text(&question("q", 0)).await;
        assert_eq!(outcome, Outcome::UpstreamFailed { refunded: true });
        assert_eq!(store.get_credits(&key()).await.unwrap(), Some(20));
        assert!(store.list_history(&key(), 10).await.unwrap().is_empty());
        assert_eq!(store.count_cache_entries().await.unwrap(), 0);
        assert!(logs_contain("answer provider failed, refunding"));
    }

    #[tokio::test]
    async fn provider_timeout_counts_as_failure() {
        let (orch, store, _) = setup(Script::Hang, false).await;

        let outcome = orch.handle_text(&question("q", 0)).await;
        assert_eq!(outcome, Outcome::UpstreamFailed { refunded: true });
        assert_eq!(store.get_credits(&key()).await.unwrap(), Some(20));
    }

    #[tokio::test]
    async fn plan_menu_labels_and_values() {
        let (orch, store, _) = setup(Script::Answer("a".into()), false).await;
        let id = store
            .insert_plan(&NewPlan {
                name: "Gold".into(),
                price: 50,
                credits: 100,
                description: None,
            })
            .await
            .unwrap();

        let menu = orch.plan_menu().await.unwrap();
        assert_eq!(
            menu,
            vec![PlanOption {
                label: "Gold - 50 USD - 100 credits".into(),
                value: format!("buy_plan_{id}"),
            }]
        );
        assert_eq!(parse_plan_choice(&menu[0].value), Some(id));
        assert_eq!(parse_plan_choice("buy_plan_x"), None);
        assert_eq!(parse_plan_choice("sell_plan_1"), None);
    }

    #[tokio::test]
    async fn register_is_idempotent_and_greets() {
        let (orch, store, _) = setup(Script::Answer("a".into()), true).await;
        let first = orch.register(&profile()).await.unwrap();
        store.debit_credits(&key(), 5).await.unwrap();
        let again = orch.register(&profile()).await.unwrap();

        assert_eq!(first.credits, 20);
        assert_eq!(again.credits, 15);
        let greeting = orch.greeting(&profile(), &again);
        assert!(greeting.starts_with("Hello Ada! I am meterbot."));
        assert!(greeting.contains("share your phone number"));
    }

    #[test]
    fn every_outcome_has_a_reply() {
        let outcomes = [
            Outcome::Answered {
                text: "x".into(),
                cached: false,
            },
            Outcome::ContactRequired,
            Outcome::RateLimited {
                retry_after: Duration::from_millis(1500),
            },
            Outcome::OutOfCredit,
            Outcome::UpstreamFailed { refunded: true },
            Outcome::UpstreamFailed { refunded: false },
            Outcome::Unavailable,
        ];
        for outcome in outcomes {
            assert!(!outcome.reply_text().is_empty());
        }
        assert!(Outcome::OutOfCredit.reply_text().contains("/buyplan"));
        assert!(
            Outcome::RateLimited {
                retry_after: Duration::from_millis(1500)
            }
            .reply_text()
            .contains("wait 2 seconds")
        );
    }
}
