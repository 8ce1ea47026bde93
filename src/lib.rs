//! # file-agent
//!
//! A tool-calling conversation loop over the local filesystem.
//!
//! This library provides:
//! - An agent loop that alternates between model calls and tool execution
//! - Three file tools: `read`, `list` and `edit`
//! - An Anthropic Messages API client
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Receive a user turn
//! 2. Call the model with the conversation and the tool schemas
//! 3. Execute any requested tools, append their results
//! 4. Repeat until the model answers without requesting tools
//!
//! ## Example
//!
//! ```rust,ignore
//! use file_agent::{agent::Agent, config::Config};
//!
//! let config = Config::from_env()?;
//! let agent = Agent::new(&config)?;
//! let mut conversation = agent.new_conversation();
//! let outcome = agent.run_turn(&mut conversation, "List the files here").await?;
//! println!("{}", outcome.answer);
//! ```

pub mod agent;
pub mod config;
pub mod llm;
pub mod tools;

pub use config::Config;
