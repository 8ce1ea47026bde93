//! Model endpoint abstraction.
//!
//! The agent loop only sees [`LlmClient`]: it hands over the conversation and
//! the tool schemas and receives one [`AssistantMessage`]. The wire format
//! lives in the concrete client.

mod anthropic;
mod mock;
mod types;

use async_trait::async_trait;
use thiserror::Error;

use crate::tools::ToolSchema;

pub use anthropic::AnthropicClient;
pub use mock::MockLlmClient;
pub use types::{AssistantMessage, Message, ToolRequest, ToolResultMessage};

/// Model call failures. All of them abort the current turn.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("authentication failed ({status}): {body}")]
    Auth { status: u16, body: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// A chat-completion endpoint that supports tool calling.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the conversation and available tools, returning the model's reply.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<AssistantMessage, LlmError>;
}
