//! Core agent loop implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::llm::{AnthropicClient, AssistantMessage, LlmClient, LlmError, Message, ToolRequest};
use crate::tools::{RegistryError, ToolRegistry, ToolSchema};

use super::conversation::Conversation;
use super::events::{AgentEvent, EventSender};
use super::executor::execute_batch;
use super::prompt::build_system_prompt;

/// Turn-level failures. The conversation is left as it was before the turn.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("model call timed out after {0:?}")]
    ModelTimeout(Duration),

    #[error("turn cancelled")]
    Cancelled,

    #[error("tool cycle limit ({0}) reached without a final answer")]
    CycleLimit(usize),

    #[error("invalid tool registry: {0}")]
    Registry(#[from] RegistryError),
}

/// States of one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    /// Waiting for the model's next reply.
    AwaitingModel,
    /// Running the tool requests of the latest reply.
    ExecutingTools(Vec<ToolRequest>),
    /// The latest reply requested no tools; holds its text.
    Done(String),
}

impl LoopState {
    fn label(&self) -> &'static str {
        match self {
            Self::AwaitingModel => "awaiting_model",
            Self::ExecutingTools(_) => "executing_tools",
            Self::Done(_) => "done",
        }
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Text of the final assistant message.
    pub answer: String,
    /// Number of tool execution cycles run.
    pub tool_cycles: usize,
    /// Number of model calls made.
    pub model_calls: usize,
}

/// The tool-calling agent.
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    tool_schemas: Vec<ToolSchema>,
    workspace: PathBuf,
    system_prompt: String,
    max_tool_cycles: Option<usize>,
    tool_concurrency: usize,
    model_timeout: Option<Duration>,
    events: Option<EventSender>,
}

impl Agent {
    /// Create an agent talking to the Anthropic endpoint from `config`.
    pub fn new(config: &Config) -> Result<Self, AgentError> {
        let llm = Arc::new(AnthropicClient::new(&config.model)?);
        Self::with_client(config, llm)
    }

    /// Create an agent with a custom model client.
    pub fn with_client(config: &Config, llm: Arc<dyn LlmClient>) -> Result<Self, AgentError> {
        let tools = ToolRegistry::new()?;
        let tool_schemas = tools.schemas();
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| build_system_prompt(&config.workspace_path, &tools));

        Ok(Self {
            llm,
            tools,
            tool_schemas,
            workspace: config.workspace_path.clone(),
            system_prompt,
            max_tool_cycles: config.max_tool_cycles,
            tool_concurrency: config.tool_concurrency.max(1),
            model_timeout: config.model.timeout,
            events: None,
        })
    }

    /// Send progress events to `events`.
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// A fresh conversation seeded with the system prompt.
    pub fn new_conversation(&self) -> Conversation {
        Conversation::with_system(self.system_prompt.clone())
    }

    /// Run one turn: append `input` and loop until the model stops requesting tools.
    ///
    /// On success the user message and every message of the turn are appended
    /// to `conversation`. On failure nothing is appended.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        input: &str,
    ) -> Result<TurnOutcome, AgentError> {
        self.run_turn_inner(conversation, input, None).await
    }

    /// Like [`Agent::run_turn`], but a pending model call is abandoned when
    /// `cancel` fires. Tool calls already started run to completion.
    pub async fn run_turn_cancellable(
        &self,
        conversation: &mut Conversation,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, AgentError> {
        self.run_turn_inner(conversation, input, Some(cancel)).await
    }

    async fn run_turn_inner(
        &self,
        conversation: &mut Conversation,
        input: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<TurnOutcome, AgentError> {
        // Messages of the turn are staged here and committed only on success.
        let mut staged = conversation.messages().to_vec();
        let committed = staged.len();
        staged.push(Message::user(input));

        match self.drive(&mut staged, cancel).await {
            Ok(outcome) => {
                conversation.extend(staged.split_off(committed));
                self.emit(AgentEvent::Response {
                    text: outcome.answer.clone(),
                });
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(
                    "Turn failed, discarding {} staged messages: {}",
                    staged.len() - committed,
                    e
                );
                self.emit(AgentEvent::TurnFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Drive the state machine over `messages` until `Done`.
    async fn drive(
        &self,
        messages: &mut Vec<Message>,
        cancel: Option<&CancellationToken>,
    ) -> Result<TurnOutcome, AgentError> {
        let mut state = LoopState::AwaitingModel;
        let mut tool_cycles = 0;
        let mut model_calls = 0;

        loop {
            let next = match state {
                LoopState::AwaitingModel => {
                    model_calls += 1;
                    self.emit(AgentEvent::ModelCall { call: model_calls });

                    let reply = self.call_model(messages, cancel).await?;
                    let next = if reply.is_final() {
                        LoopState::Done(reply.text.clone())
                    } else {
                        LoopState::ExecutingTools(reply.tool_requests.clone())
                    };
                    messages.push(reply.into());
                    next
                }
                LoopState::ExecutingTools(requests) => {
                    if let Some(limit) = self.max_tool_cycles {
                        if tool_cycles >= limit {
                            return Err(AgentError::CycleLimit(limit));
                        }
                    }
                    tool_cycles += 1;

                    for request in &requests {
                        tracing::info!("Tool call {}: {} ({})", tool_cycles, request.name, request.id);
                        self.emit(AgentEvent::ToolCall {
                            id: request.id.clone(),
                            name: request.name.clone(),
                            args: request.arguments.clone(),
                        });
                    }

                    let results = execute_batch(
                        &self.tools,
                        &self.workspace,
                        &requests,
                        self.tool_concurrency,
                    )
                    .await;

                    for result in results {
                        self.emit(AgentEvent::ToolResult {
                            id: result.request_id.clone(),
                            name: result.tool_name.clone(),
                            payload: result.payload.clone(),
                        });
                        messages.push(result.into());
                    }
                    LoopState::AwaitingModel
                }
                LoopState::Done(answer) => {
                    return Ok(TurnOutcome {
                        answer,
                        tool_cycles,
                        model_calls,
                    });
                }
            };

            tracing::debug!("Agent loop transition -> {}", next.label());
            state = next;
        }
    }

    /// One model call, bounded by the configured timeout and the cancel token.
    async fn call_model(
        &self,
        messages: &[Message],
        cancel: Option<&CancellationToken>,
    ) -> Result<AssistantMessage, AgentError> {
        let request = async {
            let call = self.llm.complete(messages, &self.tool_schemas);
            match self.model_timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(reply) => reply.map_err(AgentError::from),
                    Err(_) => Err(AgentError::ModelTimeout(limit)),
                },
                None => call.await.map_err(AgentError::from),
            }
        };

        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(AgentError::Cancelled),
                reply = request => reply,
            },
            None => request.await,
        }
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is watching.
            let _ = events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::tools::ToolPayload;
    use serde_json::json;

    fn config(workspace: &Path) -> Config {
        Config::new(
            "test-key".to_string(),
            "http://localhost".to_string(),
            workspace.to_path_buf(),
        )
    }

    fn tool_request(id: &str, name: &str, args: &[(&str, &str)]) -> ToolRequest {
        ToolRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn agent(workspace: &Path, llm: Arc<MockLlmClient>) -> Agent {
        Agent::with_client(&config(workspace), llm).unwrap()
    }

    #[tokio::test]
    async fn single_tool_cycle_then_done() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "contents").unwrap();

        let llm = Arc::new(MockLlmClient::new(vec![
            AssistantMessage::with_tool_requests(
                "",
                vec![tool_request("toolu_1", "read", &[("filename", "f.txt")])],
            ),
            AssistantMessage::text("done"),
        ]));
        let agent = agent(dir.path(), llm.clone());
        let mut conversation = Conversation::new();

        let outcome = agent.run_turn(&mut conversation, "show f.txt").await.unwrap();

        assert_eq!(
            outcome,
            TurnOutcome {
                answer: "done".to_string(),
                tool_cycles: 1,
                model_calls: 2,
            }
        );

        let messages = conversation.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], Message::user("show f.txt"));
        assert_eq!(messages[1].as_assistant().unwrap().tool_requests.len(), 1);
        let result = messages[2].as_tool_result().unwrap();
        assert_eq!(result.request_id, "toolu_1");
        assert_eq!(result.payload.get("content"), Some(&json!("contents")));
        assert_eq!(messages[3], Message::from(AssistantMessage::text("done")));
    }

    #[tokio::test]
    async fn model_sees_tool_results_on_next_call() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::new(vec![
            AssistantMessage::with_tool_requests(
                "checking",
                vec![tool_request("toolu_1", "list", &[("path", ".")])],
            ),
            AssistantMessage::text("empty directory"),
        ]));
        let agent = agent(dir.path(), llm.clone());
        let mut conversation = agent.new_conversation();

        agent.run_turn(&mut conversation, "what is here?").await.unwrap();

        let seen = llm.seen_messages();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].len(), 2);
        assert_eq!(seen[1].len(), 4);
        assert!(matches!(seen[1][0], Message::System { .. }));
        assert_eq!(
            seen[1][3].as_tool_result().unwrap().payload.get("files"),
            Some(&json!([]))
        );
    }

    #[tokio::test]
    async fn tool_errors_do_not_end_the_turn() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::new(vec![
            AssistantMessage::with_tool_requests(
                "",
                vec![
                    tool_request("a", "delete_everything", &[]),
                    tool_request("b", "read", &[]),
                    tool_request("c", "read", &[("filename", "missing.txt")]),
                ],
            ),
            AssistantMessage::text("could not do it"),
        ]));
        let agent = agent(dir.path(), llm);
        let mut conversation = Conversation::new();

        let outcome = agent.run_turn(&mut conversation, "go").await.unwrap();
        assert_eq!(outcome.answer, "could not do it");

        let results: Vec<_> = conversation
            .iter()
            .filter_map(Message::as_tool_result)
            .collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].payload, ToolPayload::error("unknown tool delete_everything"));
        assert_eq!(results[1].payload, ToolPayload::error("missing argument filename"));
        assert!(results[2].payload.is_error());
    }

    #[tokio::test]
    async fn multiple_cycles_and_turns_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::new(vec![
            AssistantMessage::with_tool_requests(
                "",
                vec![tool_request(
                    "1",
                    "edit",
                    &[("path", "notes.md"), ("old_str", ""), ("new_str", "draft")],
                )],
            ),
            AssistantMessage::with_tool_requests(
                "",
                vec![tool_request(
                    "2",
                    "edit",
                    &[("path", "notes.md"), ("old_str", "draft"), ("new_str", "final")],
                )],
            ),
            AssistantMessage::text("written"),
            AssistantMessage::text("hello again"),
        ]));
        let agent = agent(dir.path(), llm);
        let mut conversation = agent.new_conversation();

        let first = agent.run_turn(&mut conversation, "write notes").await.unwrap();
        assert_eq!(first.tool_cycles, 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("notes.md")).unwrap(),
            "final"
        );
        assert_eq!(conversation.len(), 1 + 6);

        let second = agent.run_turn(&mut conversation, "hi").await.unwrap();
        assert_eq!(second.tool_cycles, 0);
        assert_eq!(conversation.len(), 1 + 6 + 2);
        assert_eq!(
            conversation.last_assistant().map(|m| m.text.as_str()),
            Some("hello again")
        );
    }

    #[tokio::test]
    async fn model_failure_rolls_back_the_turn() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::scripted(vec![
            Ok(AssistantMessage::with_tool_requests(
                "",
                vec![tool_request("1", "list", &[("path", ".")])],
            )),
            Err(LlmError::RateLimited("busy".to_string())),
        ]));
        let agent = agent(dir.path(), llm);
        let mut conversation = agent.new_conversation();
        let before = conversation.clone();

        let err = agent.run_turn(&mut conversation, "list").await.unwrap_err();

        assert!(matches!(err, AgentError::Llm(LlmError::RateLimited(_))));
        assert_eq!(conversation, before);
    }

    #[tokio::test]
    async fn cancelled_call_leaves_conversation_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(
            MockLlmClient::new(vec![AssistantMessage::text("too late")])
                .with_delay(Duration::from_secs(30)),
        );
        let agent = agent(dir.path(), llm);
        let mut conversation = agent.new_conversation();
        let len_before = conversation.len();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = agent
            .run_turn_cancellable(&mut conversation, "slow", &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(conversation.len(), len_before);
    }

    #[tokio::test]
    async fn slow_model_call_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(
            MockLlmClient::new(vec![AssistantMessage::text("too late")])
                .with_delay(Duration::from_secs(30)),
        );
        let mut config = config(dir.path());
        config.model.timeout = Some(Duration::from_millis(20));
        let agent = Agent::with_client(&config, llm).unwrap();
        let mut conversation = Conversation::new();

        let err = agent.run_turn(&mut conversation, "slow").await.unwrap_err();

        assert!(matches!(err, AgentError::ModelTimeout(_)));
        assert!(conversation.is_empty());
    }

    #[tokio::test]
    async fn cycle_limit_aborts_the_turn() {
        let dir = tempfile::tempdir().unwrap();
        let looping = AssistantMessage::with_tool_requests(
            "",
            vec![tool_request("1", "list", &[("path", ".")])],
        );
        let llm = Arc::new(MockLlmClient::new(vec![looping.clone(), looping.clone(), looping]));
        let mut config = config(dir.path());
        config.max_tool_cycles = Some(2);
        let agent = Agent::with_client(&config, llm).unwrap();
        let mut conversation = Conversation::new();

        let err = agent.run_turn(&mut conversation, "loop").await.unwrap_err();

        assert!(matches!(err, AgentError::CycleLimit(2)));
        assert!(conversation.is_empty());
    }

    #[tokio::test]
    async fn supports_dozens_of_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let mut script: Vec<AssistantMessage> = (0..40)
            .map(|i| {
                AssistantMessage::with_tool_requests(
                    "",
                    vec![tool_request(&i.to_string(), "list", &[("path", ".")])],
                )
            })
            .collect();
        script.push(AssistantMessage::text("finished"));
        let agent = agent(dir.path(), Arc::new(MockLlmClient::new(script)));
        let mut conversation = Conversation::new();

        let outcome = agent.run_turn(&mut conversation, "go").await.unwrap();

        assert_eq!(outcome.tool_cycles, 40);
        assert_eq!(conversation.len(), 1 + 40 * 2 + 1);
    }

    #[tokio::test]
    async fn events_report_progress() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::new(vec![
            AssistantMessage::with_tool_requests(
                "",
                vec![tool_request("t1", "list", &[("path", ".")])],
            ),
            AssistantMessage::text("ok"),
        ]));
        let (tx, mut rx) = crate::agent::events::channel();
        let agent = agent(dir.path(), llm).with_events(tx);
        let mut conversation = Conversation::new();

        agent.run_turn(&mut conversation, "go").await.unwrap();
        drop(agent);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 5);
        assert_eq!(events[0], AgentEvent::ModelCall { call: 1 });
        assert!(matches!(&events[1], AgentEvent::ToolCall { id, .. } if id == "t1"));
        assert!(matches!(&events[2], AgentEvent::ToolResult { name, .. } if name == "list"));
        assert_eq!(events[3], AgentEvent::ModelCall { call: 2 });
        assert_eq!(
            events[4],
            AgentEvent::Response {
                text: "ok".to_string()
            }
        );
    }
}
