// SPDX-FileCopyrightText: 2026 Meterbot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock answer provider for deterministic testing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use meterbot_core::types::{AdapterType, HealthStatus};
use meterbot_core::{AnswerProvider, MeterError, PluginAdapter};

/// One scripted provider reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Answer(String),
    /// Fails like a network or parse error.
    Fail,
    /// Never returns; exercises the caller's timeout.
    Hang,
}

/// A mock provider that pops scripted replies from a FIFO queue.
///
/// When the queue is empty, a default "mock response" text is returned.
pub struct MockProvider {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_replies(Vec::new())
    }

    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            prompts: Arc::new(Mutex::new(Vec::new())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_answers(answers: Vec<String>) -> Self {
        Self::with_replies(answers.into_iter().map(MockReply::Answer).collect())
    }

    pub async fn push(&self, reply: MockReply) {
        self.replies.lock().await.push_back(reply);
    }

    /// Number of `answer` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
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
impl AnswerProvider for MockProvider {
    async fn answer(&self, prompt: &str) -> Result<String, MeterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().await.push(prompt.to_string());
        let reply = self
            .replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| MockReply::Answer("mock response".to_string()));
        match reply {
            MockReply::Answer(text) => Ok(text),
            MockReply::Fail => Err(MeterError::upstream("mock-provider", "scripted failure")),
            MockReply::Hang => std::future::pending().await,
        }
    }
}
