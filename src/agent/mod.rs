//! Agent module - the conversation loop.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Append the user's input to the conversation
//! 2. Call the model with the conversation and the available tools
//! 3. If the model requests tools, execute them and feed the results back
//! 4. Repeat until the model replies without requesting any tool

mod agent_loop;
mod conversation;
pub mod events;
mod executor;
mod prompt;

pub use agent_loop::{Agent, AgentError, LoopState, TurnOutcome};
pub use conversation::Conversation;
pub use events::AgentEvent;
pub use executor::execute_batch;
pub use prompt::build_system_prompt;
