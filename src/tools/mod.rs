//! Tool definitions and the dispatcher that runs them.
//!
//! Every tool is total: failures come back as a `{"error": ...}` payload
//! inside the tool result instead of unwinding the agent loop, so the model
//! can see what went wrong and adapt on its next turn.

pub mod fs;
pub mod path;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::llm::{ToolRequest, ToolResultMessage};

pub use fs::{EditFile, ListFiles, ReadFile};

/// Arguments of a tool request: argument name to string value.
pub type ToolArgs = BTreeMap<String, String>;

/// Failures a tool or the dispatcher reports back to the model.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool {0}")]
    UnknownTool(String),

    #[error("missing argument {0}")]
    MissingArgument(String),

    #[error("Path {0} does not exist")]
    PathNotFound(String),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode tool output: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ToolError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Structured outcome of one tool call. Exactly one of the two shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolPayload {
    /// `{"error": message}`
    Error { error: String },
    /// Tool-specific success fields, e.g. `{"content": ...}`
    Success(Map<String, Value>),
}

impl ToolPayload {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Serialize a tool's success output. Outputs must serialize to a JSON object.
    pub fn success<T: Serialize>(output: &T) -> Self {
        match serde_json::to_value(output) {
            Ok(Value::Object(map)) => Self::Success(map),
            Ok(other) => Self::error(format!("tool output is not an object: {}", other)),
            Err(e) => ToolError::Encode(e).into(),
        }
    }

    pub fn from_result<T: Serialize>(result: Result<T, ToolError>) -> Self {
        match result {
            Ok(output) => Self::success(&output),
            Err(e) => e.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Look up a success field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Success(map) => map.get(key),
            Self::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { error } => Some(error),
            Self::Success(_) => None,
        }
    }

    /// Compact JSON rendering sent to the model.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string())
    }
}

impl From<ToolError> for ToolPayload {
    fn from(err: ToolError) -> Self {
        Self::error(err.to_string())
    }
}

/// Structural description of one tool argument. All arguments are strings.
#[derive(Debug, Clone, Copy)]
pub struct ToolParam {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

/// Tool description handed to the model endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A tool the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of the tool.
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// Arguments the tool accepts.
    fn parameters(&self) -> &[ToolParam];

    /// Argument naming the filesystem path the tool touches, if any.
    /// Calls resolving to the same path are never run concurrently.
    fn target_argument(&self) -> Option<&str> {
        None
    }

    /// Execute the tool. Required arguments are guaranteed present.
    async fn execute(&self, args: &ToolArgs, workspace: &Path) -> ToolPayload;
}

/// Reasons a set of tools cannot form a registry.
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("tool {0} is registered twice")]
    DuplicateTool(String),

    #[error("tool name must not be empty")]
    EmptyName,

    #[error("tool {0} has no description")]
    MissingDescription(String),

    #[error("tool {tool} declares parameter {param} twice")]
    DuplicateParameter { tool: String, param: String },

    #[error("tool {tool} targets undeclared parameter {param}")]
    UnknownTarget { tool: String, param: String },
}

/// Registry of available tools, keyed by name.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry holding the built-in file tools.
    pub fn new() -> Result<Self, RegistryError> {
        Self::with_tools(vec![
            Arc::new(ReadFile),
            Arc::new(ListFiles),
            Arc::new(EditFile),
        ])
    }

    /// Build a registry from explicit tools, validating their descriptions.
    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Result<Self, RegistryError> {
        let mut map: BTreeMap<String, Arc<dyn Tool>> = BTreeMap::new();
        for tool in tools {
            validate_tool(tool.as_ref())?;
            let name = tool.name().to_string();
            if map.contains_key(&name) {
                return Err(RegistryError::DuplicateTool(name));
            }
            map.insert(name, tool);
        }
        Ok(Self { tools: map })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Tool descriptions for the model, derived from each tool's parameters.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .values()
            .map(|tool| {
                let properties: Map<String, Value> = tool
                    .parameters()
                    .iter()
                    .map(|p| {
                        (
                            p.name.to_string(),
                            json!({ "type": "string", "description": p.description }),
                        )
                    })
                    .collect();
                let required: Vec<&str> = tool
                    .parameters()
                    .iter()
                    .filter(|p| p.required)
                    .map(|p| p.name)
                    .collect();

                ToolSchema {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    input_schema: json!({
                        "type": "object",
                        "properties": properties,
                        "required": required,
                    }),
                }
            })
            .collect()
    }

    /// Resolved path a request would touch, for serializing same-file calls.
    pub fn target_path(&self, request: &ToolRequest, workspace: &Path) -> Option<PathBuf> {
        let tool = self.tools.get(&request.name)?;
        let arg = tool.target_argument()?;
        let value = request.arguments.get(arg)?;
        Some(path::resolve(workspace, value))
    }

    /// Run one tool request and package its outcome as a tool result.
    pub async fn dispatch(&self, request: &ToolRequest, workspace: &Path) -> ToolResultMessage {
        let payload = self
            .execute(&request.name, &request.arguments, workspace)
            .await;

        if let Some(error) = payload.error_message() {
            tracing::warn!("Tool {} ({}) failed: {}", request.name, request.id, error);
        }

        ToolResultMessage {
            request_id: request.id.clone(),
            tool_name: request.name.clone(),
            payload,
        }
    }

    /// Look up a tool by name, check its required arguments and execute it.
    pub async fn execute(&self, name: &str, args: &ToolArgs, workspace: &Path) -> ToolPayload {
        let Some(tool) = self.tools.get(name) else {
            return ToolError::UnknownTool(name.to_string()).into();
        };

        if let Some(missing) = tool
            .parameters()
            .iter()
            .find(|p| p.required && !args.contains_key(p.name))
        {
            return ToolError::MissingArgument(missing.name.to_string()).into();
        }

        tracing::debug!("Executing tool {} with args [{}]", name, arg_summary(args));
        tool.execute(args, workspace).await
    }
}

/// Argument names with value sizes, for logs. Values can be whole files.
fn arg_summary(args: &ToolArgs) -> String {
    args.iter()
        .map(|(k, v)| format!("{}: {} bytes", k, v.len()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn validate_tool(tool: &dyn Tool) -> Result<(), RegistryError> {
    let name = tool.name();
    if name.trim().is_empty() {
        return Err(RegistryError::EmptyName);
    }
    if tool.description().trim().is_empty() {
        return Err(RegistryError::MissingDescription(name.to_string()));
    }

    let mut seen = HashSet::new();
    for param in tool.parameters() {
        if !seen.insert(param.name) {
            return Err(RegistryError::DuplicateParameter {
                tool: name.to_string(),
                param: param.name.to_string(),
            });
        }
    }

    if let Some(target) = tool.target_argument() {
        if !seen.contains(target) {
            return Err(RegistryError::UnknownTarget {
                tool: name.to_string(),
                param: target.to_string(),
            });
        }
    }

    Ok(())
}

/// Fetch an argument the dispatcher has already checked for presence.
pub(crate) fn required_arg<'a>(args: &'a ToolArgs, name: &str) -> Result<&'a str, ToolError> {
    args.get(name)
        .map(String::as_str)
        .ok_or_else(|| ToolError::MissingArgument(name.to_string()))
}
