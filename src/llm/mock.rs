use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{AssistantMessage, LlmClient, LlmError, Message};
use crate::tools::ToolSchema;

/// A scripted LLM client for tests and offline runs.
///
/// Replies are handed out in order; every call records the conversation it
/// was given.
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<AssistantMessage, LlmError>>>,
    seen: Mutex<Vec<Vec<Message>>>,
    delay: Option<Duration>,
}

impl MockLlmClient {
    pub fn new(responses: Vec<AssistantMessage>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    pub fn scripted(responses: Vec<Result<AssistantMessage, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            seen: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or(0)
    }

    /// Conversations passed to each call so far.
    pub fn seen_messages(&self) -> Vec<Vec<Message>> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
    ) -> Result<AssistantMessage, LlmError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .responses
            .lock()
            .map_err(|_| LlmError::Request("mock response lock poisoned".to_string()))?
            .pop_front();
        next.unwrap_or_else(|| {
            Err(LlmError::InvalidResponse(
                "no scripted responses left".to_string(),
            ))
        })
    }
}
