//! Anthropic Messages API client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{AssistantMessage, LlmClient, LlmError, Message, ToolRequest};
use crate::config::ModelConfig;
use crate::tools::{ToolArgs, ToolSchema};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for `POST {base_url}/v1/messages`.
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(config: &ModelConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("file-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<AssistantMessage, LlmError> {
        let (system, wire_messages) = to_wire_messages(messages);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system,
            messages: wire_messages,
            tools: tools
                .iter()
                .map(|t| WireTool {
                    name: &t.name,
                    description: &t.description,
                    input_schema: &t.input_schema,
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        tracing::debug!("Anthropic API response: status={}", status);

        match status.as_u16() {
            401 | 403 => {
                return Err(LlmError::Auth {
                    status: status.as_u16(),
                    body: truncate(&text, 500),
                })
            }
            429 => return Err(LlmError::RateLimited(truncate(&text, 500))),
            _ if !status.is_success() => {
                return Err(LlmError::Status {
                    status: status.as_u16(),
                    body: truncate(&text, 500),
                })
            }
            _ => {}
        }

        let parsed: MessagesResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::InvalidResponse(format!("parse failed: {}", e)))?;

        if let Some(reason) = &parsed.stop_reason {
            tracing::debug!("Stop reason: {}", reason);
        }

        Ok(from_wire_content(parsed.content))
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct WireMessage {
    role: WireRole,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum WireRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

/// Stand-in text for an assistant reply with no content.
const EMPTY_REPLY: &str = "(no content)";

/// Split system messages out and fold the rest into alternating wire messages.
/// Consecutive messages of the same role (tool results after an assistant
/// turn, a user retry) are merged into one.
fn to_wire_messages(messages: &[Message]) -> (Option<String>, Vec<WireMessage>) {
    let mut system_parts = Vec::new();
    let mut wire: Vec<WireMessage> = Vec::new();

    let mut push = |role: WireRole, blocks: Vec<ContentBlock>| {
        if blocks.is_empty() {
            return;
        }
        match wire.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => wire.push(WireMessage {
                role,
                content: blocks,
            }),
        }
    };

    for message in messages {
        match message {
            Message::System { text } => system_parts.push(text.clone()),
            Message::User { text } => {
                push(WireRole::User, vec![ContentBlock::Text { text: text.clone() }])
            }
            Message::Assistant(assistant) => {
                let mut blocks = Vec::new();
                if !assistant.text.is_empty() {
                    blocks.push(ContentBlock::Text {
                        text: assistant.text.clone(),
                    });
                }
                blocks.extend(assistant.tool_requests.iter().map(|request| {
                    ContentBlock::ToolUse {
                        id: request.id.clone(),
                        name: request.name.clone(),
                        input: Value::Object(
                            request
                                .arguments
                                .iter()
                                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                                .collect(),
                        ),
                    }
                }));
                // The endpoint rejects empty text blocks, and dropping the
                // reply would merge the surrounding user turns.
                if blocks.is_empty() {
                    blocks.push(ContentBlock::Text {
                        text: EMPTY_REPLY.to_string(),
                    });
                }
                push(WireRole::Assistant, blocks);
            }
            Message::ToolResult(result) => push(
                WireRole::User,
                vec![ContentBlock::ToolResult {
                    tool_use_id: result.request_id.clone(),
                    content: result.payload.to_json_string(),
                    is_error: result.payload.is_error(),
                }],
            ),
        }
    }

    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
    (system, wire)
}

fn from_wire_content(content: Vec<ContentBlock>) -> AssistantMessage {
    let mut texts = Vec::new();
    let mut tool_requests = Vec::new();

    for block in content {
        match block {
            ContentBlock::Text { text } => texts.push(text),
            ContentBlock::ToolUse { id, name, input } => tool_requests.push(ToolRequest {
                id,
                name,
                arguments: to_tool_args(input),
            }),
            ContentBlock::ToolResult { .. } | ContentBlock::Unsupported => {}
        }
    }

    AssistantMessage {
        text: texts.join("\n"),
        tool_requests,
    }
}

/// Tool inputs are flattened to strings. Non-object input yields no
/// arguments, which the dispatcher reports back as a missing argument.
fn to_tool_args(input: Value) -> ToolArgs {
    match input {
        Value::Object(map) => flatten_args(map),
        other => {
            tracing::warn!("Ignoring non-object tool input: {}", other);
            ToolArgs::new()
        }
    }
}

fn flatten_args(map: Map<String, Value>) -> ToolArgs {
    map.into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect()
}

fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars).collect();
    format!("{}...(+{} chars)", truncated, char_count - max_chars)
}
