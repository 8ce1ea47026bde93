//! System prompt template for the agent.

use std::path::Path;

use crate::tools::ToolRegistry;

/// Build the system prompt with tool descriptions.
pub fn build_system_prompt(workspace_path: &Path, tools: &ToolRegistry) -> String {
    let tool_descriptions = tools
        .names()
        .filter_map(|name| tools.get(name))
        .map(|t| format!("- **{}**: {}", t.name(), t.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a coding assistant whose goal is to help solve coding tasks. You work in the directory: {workspace_path}

## Your Tools

{tool_descriptions}

## Rules

1. **Use the tools** - Read and list files instead of guessing their contents.

2. **Read before edit** - Always read a file before modifying it, unless you are creating a new file.

3. **Check results** - Every tool returns a JSON result. An `error` field means the call failed; an edit reports what it did in its `action` field.

4. **Stay focused** - Only change what the task asks for.

When the task is complete, reply with a short summary of what you did and which files changed."#,
        workspace_path = workspace_path.display(),
        tool_descriptions = tool_descriptions
    )
}
