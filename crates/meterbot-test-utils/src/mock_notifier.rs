// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock notifier capturing every message sent to a user.

use async_trait::async_trait;
use tokio::sync::Mutex;

use meterbot_core::{MeterError, Notifier, UserKey};

#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<(UserKey, String)>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(UserKey, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, user_key: &UserKey, text: &str) -> Result<(), MeterError> {
        self.sent
            .lock()
            .await
            .push((user_key.clone(), text.to_string()));
        Ok(())
    }
}
