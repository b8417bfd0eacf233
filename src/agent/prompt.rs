//! System prompt templates for the agent.

use crate::sandbox::Sandbox;
use crate::tools::{truncate_chars, ToolKind};

/// Maximum characters of project context inlined into the prompt.
const CONTEXT_MAX_CHARS: usize = 8_000;

/// Build the system prompt, optionally followed by project context.
pub fn build_system_prompt(workspace_path: &str, project_context: Option<&str>) -> String {
    let tool_descriptions = ToolKind::ALL
        .iter()
        .map(|t| format!("- **{}**: {}", t.name(), t.description()))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!(
        r#"You are a task agent working on behalf of another assistant. You operate in the directory: {workspace_path}

## Your Tools

{tool_descriptions}

## Rules

1. **Use tools** - Inspect files and run commands instead of guessing.

2. **Stay inside the working directory** - Paths are relative to it; anything outside is rejected.

3. **Read before edit** - Read a file before changing it so `edit_file` gets the exact text.

4. **React to errors** - Tool failures come back as text starting with `ERROR:`. Read them and adjust.

5. **Stay focused** - Only do what the task asks.

## Response Format

When the task is done, reply without tool calls and give a concise summary of:
- What you did
- Files created or modified
- Anything left unresolved"#,
        workspace_path = workspace_path,
        tool_descriptions = tool_descriptions
    );

    if let Some(context) = project_context.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str("\n\n## Project Context\n\n");
        prompt.push_str(&truncate_chars(
            context,
            CONTEXT_MAX_CHARS,
            "\n... [context truncated]",
        ));
    }
    prompt
}

/// Read the project context file from the sandbox, if it exists.
pub async fn load_project_context(sandbox: &Sandbox, file_name: &str) -> Option<String> {
    if file_name.trim().is_empty() {
        return None;
    }
    let path = sandbox.resolve(file_name).ok()?;
    if !path.is_file() {
        return None;
    }
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => {
            tracing::debug!("Loaded project context from {}", path.display());
            Some(content)
        }
        Err(e) => {
            tracing::warn!("Ignoring unreadable project context {}: {}", path.display(), e);
            None
        }
    }
}
