// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message classification, command parsing, and reply formatting.
//!
//! Everything here is free of network I/O so it can be tested against
//! deserialized Telegram updates.

use meterbot_agent::PlanOption;
use meterbot_core::types::{Platform, UserProfile};
use meterbot_core::{MeterError, UserKey};
use meterbot_payment::Checkout;
use teloxide::prelude::*;
use teloxide::types::{
    ButtonRequest, ChatKind, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton,
    KeyboardMarkup,
};

/// Telegram's hard limit on message text length, in UTF-16 code units.
/// Counting chars keeps every chunk at or below it for BMP text.
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    BuyPlan,
}

/// What an inbound message asks the bot to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Command(Command),
    Question(String),
    Contact {
        contact_user_id: Option<String>,
        phone_number: String,
    },
    /// Unknown commands, media and service messages.
    Ignored,
}

/// Parses `/start`, `/help`, `/buyplan`, also in the `/cmd@botname args` form.
pub fn parse_command(text: &str) -> Option<Command> {
    let word = text.trim().split_whitespace().next()?;
    let name = word.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    match name.to_ascii_lowercase().as_str() {
        "start" => Some(Command::Start),
        "help" => Some(Command::Help),
        "buyplan" => Some(Command::BuyPlan),
        _ => None,
    }
}

pub fn is_dm(msg: &Message) -> bool {
    matches!(msg.chat.kind, ChatKind::Private(_))
}

pub fn classify(msg: &Message) -> Incoming {
    if let Some(contact) = msg.contact() {
        return Incoming::Contact {
            contact_user_id: contact.user_id.map(|id| id.0.to_string()),
            phone_number: contact.phone_number.clone(),
        };
    }
    let Some(text) = msg.text() else {
        return Incoming::Ignored;
    };
    if text.trim_start().starts_with('/') {
        return match parse_command(text) {
            Some(cmd) => Incoming::Command(cmd),
            None => Incoming::Ignored,
        };
    }
    if text.trim().is_empty() {
        return Incoming::Ignored;
    }
    Incoming::Question(text.to_string())
}

pub fn profile_of(user: &teloxide::types::User) -> UserProfile {
    UserProfile {
        platform: Platform::Telegram,
        platform_user_id: user.id.0.to_string(),
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()),
    }
}

/// Chat id of a Telegram user key, `None` for other platforms.
pub fn chat_id_of(user_key: &UserKey) -> Option<ChatId> {
    let (id, code) = user_key.as_str().rsplit_once('-')?;
    if code != Platform::Telegram.code().to_string() {
        return None;
    }
    id.parse().ok().map(ChatId)
}

pub fn plan_keyboard(options: &[PlanOption]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(options.iter().map(|option| {
        vec![InlineKeyboardButton::callback(
            option.label.clone(),
            option.value.clone(),
        )]
    }))
}

pub fn contact_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new("Share phone number").request(ButtonRequest::Contact),
    ]])
    .resize_keyboard()
    .one_time_keyboard()
}

/// Reply to a plan selection.
pub fn purchase_reply(result: &Result<Checkout, MeterError>) -> String {
    match result {
        Ok(checkout) => format!(
            "Please complete the payment here: {}",
            checkout.redirect_url
        ),
        Err(MeterError::NotFound { entity: "plan", .. }) => "Invalid plan selected.".to_string(),
        Err(e) if e.is_upstream_failure() => {
            "Failed to initiate payment. Please try again later.".to_string()
        }
        Err(_) => "Could not initiate payment. Please try again later.".to_string(),
    }
}

/// Splits `text` into chunks Telegram accepts, preferring line breaks.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_chars {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(extra: serde_json::Value, chat_type: &str) -> Message {
        let chat = if chat_type == "private" {
            serde_json::json!({"id": 4242, "type": "private", "first_name": "Test"})
        } else {
            serde_json::json!({"id": -100, "type": chat_type, "title": "Group"})
        };
        let mut json = serde_json::json!({
            "message_id": 1,
            "date": 1700000000i64,
            "chat": chat,
            "from": {"id": 4242, "is_bot": false, "first_name": "Test", "username": "tester"},
        });
        for (k, v) in extra.as_object().unwrap() {
            json[k] = v.clone();
        }
        serde_json::from_value(json).expect("failed to deserialize mock message")
    }

    #[test]
    fn commands_parse_with_bot_suffix_and_args() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/help@meter_bot"), Some(Command::Help));
        assert_eq!(parse_command("  /BuyPlan now"), Some(Command::BuyPlan));
        assert_eq!(parse_command("/unknown"), None);
        assert_eq!(parse_command("start"), None);
    }

    #[test]
    fn classify_text_commands_and_contacts() {
        let question = message(serde_json::json!({"text": "What is Rust?"}), "private");
        assert!(is_dm(&question));
        assert_eq!(classify(&question), Incoming::Question("What is Rust?".into()));

        let cmd = message(serde_json::json!({"text": "/buyplan"}), "private");
        assert_eq!(classify(&cmd), Incoming::Command(Command::BuyPlan));

        let unknown = message(serde_json::json!({"text": "/settings"}), "private");
        assert_eq!(classify(&unknown), Incoming::Ignored);

        let contact = message(
            serde_json::json!({"contact": {"phone_number": "+989121234567", "first_name": "Test", "user_id": 4242}}),
            "private",
        );
        assert_eq!(
            classify(&contact),
            Incoming::Contact {
                contact_user_id: Some("4242".into()),
                phone_number: "+989121234567".into()
            }
        );
    }

    #[test]
    fn group_messages_are_not_dms() {
        let msg = message(serde_json::json!({"text": "hi"}), "group");
        assert!(!is_dm(&msg));
    }

    #[test]
    fn profile_uses_telegram_user_id() {
        let msg = message(serde_json::json!({"text": "hi"}), "private");
        let profile = profile_of(msg.from.as_ref().unwrap());
        assert_eq!(profile.user_key().as_str(), "4242-0");
        assert_eq!(profile.username.as_deref(), Some("tester"));
    }

    #[test]
    fn chat_id_only_for_telegram_keys() {
        assert_eq!(chat_id_of(&UserKey("4242-0".into())), Some(ChatId(4242)));
        assert_eq!(chat_id_of(&UserKey("4242-1".into())), None);
        assert_eq!(chat_id_of(&UserKey("garbage".into())), None);
    }

    #[test]
    fn plan_keyboard_has_one_row_per_plan() {
        let keyboard = plan_keyboard(&[
            PlanOption {
                label: "Basic - 10 USD - 20 credits".into(),
                value: "buy_plan_1".into(),
            },
            PlanOption {
                label: "Gold - 50 USD - 100 credits".into(),
                value: "buy_plan_2".into(),
            },
        ]);
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(keyboard.inline_keyboard[1][0].text, "Gold - 50 USD - 100 credits");
    }

    #[test]
    fn purchase_replies_by_outcome() {
        let ok = Ok(Checkout {
            payment_id: 1,
            redirect_url: "https://pay.test/StartPay/A1".into(),
        });
        assert_eq!(
            purchase_reply(&ok),
            "Please complete the payment here: https://pay.test/StartPay/A1"
        );
        assert_eq!(
            purchase_reply(&Err(MeterError::not_found("plan", "9"))),
            "Invalid plan selected."
        );
        assert!(purchase_reply(&Err(MeterError::upstream("zarinpal", "down"))).starts_with("Failed"));
        assert!(purchase_reply(&Err(MeterError::Internal("x".into()))).starts_with("Could not"));
    }

    #[test]
    fn split_message_respects_limit() {
        assert_eq!(split_message("short", 10), vec!["short"]);
        assert_eq!(split_message("", 10), vec![""]);

        let text = "line one\nline two\nline three";
        let chunks = split_message(text, 10);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), text);

        let long = "x".repeat(25);
        let chunks = split_message(&long, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), long);
    }
}
