//! Conversation message types shared by the agent loop and model clients.

use serde::{Deserialize, Serialize};

use crate::tools::{ToolArgs, ToolPayload};

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Opaque id generated by the model endpoint
    pub id: String,
    /// Name of the requested tool
    pub name: String,
    /// Argument name to value
    #[serde(default)]
    pub arguments: ToolArgs,
}

/// One model response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub text: String,
    #[serde(default)]
    pub tool_requests: Vec<ToolRequest>,
}

impl AssistantMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_requests: Vec::new(),
        }
    }

    pub fn with_tool_requests(text: impl Into<String>, tool_requests: Vec<ToolRequest>) -> Self {
        Self {
            text: text.into(),
            tool_requests,
        }
    }

    /// A response is final only when it requests no tools.
    pub fn is_final(&self) -> bool {
        self.tool_requests.is_empty()
    }
}

/// Outcome of one tool request, correlated by `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultMessage {
    pub request_id: String,
    pub tool_name: String,
    pub payload: ToolPayload,
}

/// A conversation entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System { text: String },
    User { text: String },
    Assistant(AssistantMessage),
    ToolResult(ToolResultMessage),
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::System { text: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Self::Assistant(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResultMessage> {
        match self {
            Self::ToolResult(result) => Some(result),
            _ => None,
        }
    }
}

impl From<AssistantMessage> for Message {
    fn from(message: AssistantMessage) -> Self {
        Self::Assistant(message)
    }
}

impl From<ToolResultMessage> for Message {
    fn from(result: ToolResultMessage) -> Self {
        Self::ToolResult(result)
    }
}
