// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram transport for meterbot.
//!
//! Long-polls the Bot API with teloxide and relays private messages to the
//! [`Orchestrator`]: commands (`/start`, `/help`, `/buyplan`), plain-text
//! questions, contact shares, and `buy_plan_{id}` inline button presses.
//! [`TelegramNotifier`] pushes payment results back to the buyer.

pub mod handler;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meterbot_agent::{parse_plan_choice, Orchestrator, Outcome, TextEvent};
use meterbot_config::model::TelegramConfig;
use meterbot_core::types::{AdapterType, HealthStatus, UserProfile};
use meterbot_core::{MeterError, Notifier, PluginAdapter, UserKey};
use meterbot_payment::PaymentCoordinator;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, KeyboardRemove, ReplyMarkup};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::handler::{Command, Incoming};

/// Everything the update handlers need.
pub struct BotContext {
    pub orchestrator: Arc<Orchestrator>,
    pub coordinator: Arc<PaymentCoordinator>,
}

pub struct TelegramChannel {
    bot: Bot,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Result<Self, MeterError> {
        let token = config.bot_token.as_deref().ok_or_else(|| {
            MeterError::Config("telegram.bot_token is required for the Telegram transport".into())
        })?;

        if token.is_empty() {
            return Err(MeterError::Config(
                "telegram.bot_token cannot be empty".into(),
            ));
        }

        Ok(Self {
            bot: Bot::new(token),
        })
    }

    pub fn notifier(&self) -> TelegramNotifier {
        TelegramNotifier {
            bot: self.bot.clone(),
        }
    }

    /// Dispatches updates until `cancel` fires.
    pub async fn run(&self, ctx: Arc<BotContext>, cancel: CancellationToken) {
        let message_ctx = Arc::clone(&ctx);
        let query_ctx = ctx;

        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
                let ctx = Arc::clone(&message_ctx);
                async move {
                    on_message(&bot, &msg, &ctx).await;
                    respond(())
                }
            }))
            .branch(
                Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
                    let ctx = Arc::clone(&query_ctx);
                    async move {
                        on_callback_query(&bot, &q, &ctx).await;
                        respond(())
                    }
                }),
            );

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .default_handler(|_| async {})
            .build();

        let shutdown = dispatcher.shutdown_token();
        tokio::spawn(async move {
            cancel.cancelled().await;
            // The dispatcher reports idle until polling has started.
            for _ in 0..50 {
                match shutdown.shutdown() {
                    Ok(stopped) => {
                        stopped.await;
                        return;
                    }
                    Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
                }
            }
            warn!("telegram dispatcher did not acknowledge shutdown");
        });

        info!("starting Telegram long polling");
        dispatcher.dispatch().await;
        info!("Telegram long polling stopped");
    }
}

#[async_trait]
impl PluginAdapter for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, MeterError> {
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Telegram bot unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), MeterError> {
        debug!("Telegram channel shutting down");
        Ok(())
    }
}

/// Sends chat messages to Telegram users by their user key.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, user_key: &UserKey, text: &str) -> Result<(), MeterError> {
        let chat_id = handler::chat_id_of(user_key).ok_or_else(|| {
            MeterError::Internal(format!("{user_key} is not a Telegram user"))
        })?;
        self.bot
            .send_message(chat_id, text)
            .await
            .map_err(|e| MeterError::UpstreamCallFailed {
                service: "telegram".into(),
                message: format!("failed to send notification: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(())
    }
}

async fn on_message(bot: &Bot, msg: &Message, ctx: &BotContext) {
    if !handler::is_dm(msg) {
        debug!(chat_id = msg.chat.id.0, "ignoring non-DM message");
        return;
    }
    let Some(user) = msg.from.as_ref() else {
        return;
    };
    let profile = handler::profile_of(user);
    let chat = msg.chat.id;

    match handler::classify(msg) {
        Incoming::Command(Command::Start) => on_start(bot, chat, &profile, ctx).await,
        Incoming::Command(Command::Help) => {
            send_text(bot, chat, &ctx.orchestrator.help_text(), None).await;
        }
        Incoming::Command(Command::BuyPlan) => on_buy_plan(bot, chat, ctx).await,
        Incoming::Contact {
            contact_user_id,
            phone_number,
        } => {
            match ctx
                .orchestrator
                .record_contact(&profile, contact_user_id.as_deref(), &phone_number)
                .await
            {
                Ok(outcome) => {
                    let markup = ReplyMarkup::from(KeyboardRemove::new());
                    send_text(bot, chat, outcome.reply_text(), Some(markup)).await;
                }
                Err(e) => {
                    error!(error = %e, "failed to record contact");
                    send_text(bot, chat, &Outcome::Unavailable.reply_text(), None).await;
                }
            }
        }
        Incoming::Question(text) => {
            if let Err(e) = bot.send_chat_action(chat, ChatAction::Typing).await {
                debug!(error = %e, "typing indicator failed");
            }
            let event = TextEvent {
                profile,
                text,
                received_at: msg.date,
            };
            let outcome = ctx.orchestrator.handle_text(&event).await;
            let markup = matches!(outcome, Outcome::ContactRequired)
                .then(|| handler::contact_keyboard().into());
            send_text(bot, chat, &outcome.reply_text(), markup).await;
        }
        Incoming::Ignored => {
            debug!(msg_id = msg.id.0, "ignoring unsupported message");
        }
    }
}

async fn on_start(bot: &Bot, chat: ChatId, profile: &UserProfile, ctx: &BotContext) {
    match ctx.orchestrator.register(profile).await {
        Ok(user) => {
            let markup = ctx
                .orchestrator
                .contact_missing(&user)
                .then(|| handler::contact_keyboard().into());
            send_text(bot, chat, &ctx.orchestrator.greeting(profile, &user), markup).await;
        }
        Err(e) => {
            error!(error = %e, "failed to register user");
            send_text(bot, chat, &Outcome::Unavailable.reply_text(), None).await;
        }
    }
}

async fn on_buy_plan(bot: &Bot, chat: ChatId, ctx: &BotContext) {
    match ctx.orchestrator.plan_menu().await {
        Ok(options) if options.is_empty() => {
            send_text(bot, chat, "No plans available at the moment.", None).await;
        }
        Ok(options) => {
            let markup = handler::plan_keyboard(&options).into();
            send_text(bot, chat, "Available plans:", Some(markup)).await;
        }
        Err(e) => {
            error!(error = %e, "failed to list plans");
            send_text(bot, chat, "Sorry, an error occurred while fetching plans.", None).await;
        }
    }
}

async fn on_callback_query(bot: &Bot, q: &CallbackQuery, ctx: &BotContext) {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        debug!(error = %e, "failed to acknowledge callback query");
    }
    let Some(plan_id) = q.data.as_deref().and_then(parse_plan_choice) else {
        debug!("ignoring unknown callback data");
        return;
    };

    let profile = handler::profile_of(&q.from);
    let result = match ctx.orchestrator.register(&profile).await {
        Ok(user) => ctx.coordinator.create(&user.user_key, plan_id).await,
        Err(e) => Err(e),
    };
    if let Err(e) = &result {
        warn!(plan_id, error = %e, "plan purchase could not be started");
    }

    send_text(
        bot,
        ChatId::from(q.from.id),
        &handler::purchase_reply(&result),
        None,
    )
    .await;
}

/// Sends `text`, split to Telegram's length limit. The markup goes on the last chunk.
async fn send_text(bot: &Bot, chat: ChatId, text: &str, markup: Option<ReplyMarkup>) {
    let chunks = handler::split_message(text, handler::MAX_MESSAGE_CHARS);
    let last = chunks.len().saturating_sub(1);
    let mut markup = markup;
    for (i, chunk) in chunks.into_iter().enumerate() {
        let mut request = bot.send_message(chat, chunk);
        if i == last
            && let Some(m) = markup.take()
        {
            request = request.reply_markup(m);
        }
        if let Err(e) = request.await {
            warn!(chat_id = chat.0, error = %e, "failed to send message");
            return;
        }
    }
}
