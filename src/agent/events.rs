use tokio::sync::mpsc;

use crate::tools::{ToolArgs, ToolPayload};

/// Progress events emitted while a turn runs.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A model call is about to be sent (1-based within the turn).
    ModelCall { call: usize },
    /// The model requested a tool.
    ToolCall {
        id: String,
        name: String,
        args: ToolArgs,
    },
    /// Tool execution completed.
    ToolResult {
        id: String,
        name: String,
        payload: ToolPayload,
    },
    /// The turn finished with this answer.
    Response { text: String },
    /// The turn failed and was rolled back.
    TurnFailed { message: String },
}

pub type EventSender = mpsc::UnboundedSender<AgentEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<AgentEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
