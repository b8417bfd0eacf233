//! Tool executor: the tools the model can call, confined to the task's sandbox.
//!
//! Each call is dispatched on [`ToolKind`] and produces exactly one text blob.
//! Failures never propagate: they come back as `ERROR: ...` strings so the
//! model can read them and react on its next turn.

mod fs;
mod search;
mod terminal;
mod web;

pub use web::{BraveSearch, DisabledSearch, SearchProvider};

use std::str::FromStr;
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;

use crate::config::{SearchConfig, ToolLimits};
use crate::llm::{FunctionSchema, ToolSchema};
use crate::sandbox::{Sandbox, SandboxError};

/// Prefix of every failed tool result.
pub const ERROR_PREFIX: &str = "ERROR:";

/// Tool-level failures, rendered to the model as `ERROR: <message>`.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Missing required argument '{0}'")]
    MissingArgument(&'static str),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("old_string not found")]
    OldStringNotFound,

    #[error("Invalid regex: {0}")]
    InvalidRegex(String),

    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    #[error("Command timed out after {0}s")]
    Timeout(u64),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Every tool the executor knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ReadFile,
    WriteFile,
    EditFile,
    RunBash,
    Glob,
    Grep,
    ListDir,
    WebSearch,
}

impl ToolKind {
    pub const ALL: [ToolKind; 8] = [
        ToolKind::ReadFile,
        ToolKind::WriteFile,
        ToolKind::EditFile,
        ToolKind::RunBash,
        ToolKind::Glob,
        ToolKind::Grep,
        ToolKind::ListDir,
        ToolKind::WebSearch,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::EditFile => "edit_file",
            Self::RunBash => "run_bash",
            Self::Glob => "glob",
            Self::Grep => "grep",
            Self::ListDir => "list_dir",
            Self::WebSearch => "web_search",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::ReadFile => "Read a text file from the working directory and return its contents.",
            Self::WriteFile => "Write content to a file, creating parent directories as needed. Overwrites existing files.",
            Self::EditFile => "Replace the first exact occurrence of old_string with new_string in a file. Read the file first to get the exact text.",
            Self::RunBash => "Run a shell command in the working directory. Returns stdout and stderr; non-zero exits include the exit code.",
            Self::Glob => "Find files matching a glob pattern (e.g. '**/*.rs') relative to the working directory.",
            Self::Grep => "Search file contents with a regular expression. Returns path:line: text for each match.",
            Self::ListDir => "List the entries of a directory, marking each as [DIR] or [FILE].",
            Self::WebSearch => "Search the web and return a summary of the top results with URLs.",
        }
    }

    pub fn parameters(self) -> Value {
        match self {
            Self::ReadFile => json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path relative to the working directory"}
                },
                "required": ["path"]
            }),
            Self::WriteFile => json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path relative to the working directory"},
                    "content": {"type": "string", "description": "Full file content to write"}
                },
                "required": ["path", "content"]
            }),
            Self::EditFile => json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path relative to the working directory"},
                    "old_string": {"type": "string", "description": "Exact text to replace"},
                    "new_string": {"type": "string", "description": "Replacement text"}
                },
                "required": ["path", "old_string", "new_string"]
            }),
            Self::RunBash => json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "The shell command to execute"},
                    "timeout": {"type": "integer", "description": "Timeout in seconds (capped by the server maximum)"}
                },
                "required": ["command"]
            }),
            Self::Glob => json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "Glob pattern relative to the working directory"}
                },
                "required": ["pattern"]
            }),
            Self::Grep => json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "Regular expression to search for"},
                    "path": {"type": "string", "description": "File or directory to search. Defaults to the working directory."}
                },
                "required": ["pattern"]
            }),
            Self::ListDir => json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Directory relative to the working directory. Defaults to '.'"}
                }
            }),
            Self::WebSearch => json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The search query"}
                },
                "required": ["query"]
            }),
        }
    }

    pub fn schema(self) -> ToolSchema {
        ToolSchema {
            schema_type: "function",
            function: FunctionSchema {
                name: self.name(),
                description: self.description(),
                parameters: self.parameters(),
            },
        }
    }
}

impl FromStr for ToolKind {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ToolError::UnknownTool(s.to_string()))
    }
}

/// Schemas for every tool, in a stable order.
pub fn tool_schemas() -> Vec<ToolSchema> {
    ToolKind::ALL.into_iter().map(ToolKind::schema).collect()
}

/// Runs tool calls for one task. Calls are executed one at a time.
pub struct ToolExecutor {
    sandbox: Sandbox,
    limits: ToolLimits,
    search: Arc<dyn SearchProvider>,
    search_config: SearchConfig,
}

impl ToolExecutor {
    pub fn new(
        sandbox: Sandbox,
        limits: ToolLimits,
        search: Arc<dyn SearchProvider>,
        search_config: SearchConfig,
    ) -> Self {
        Self {
            sandbox,
            limits,
            search,
            search_config,
        }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn limits(&self) -> &ToolLimits {
        &self.limits
    }

    /// Execute one tool call. Never fails: errors become `ERROR:` strings.
    pub async fn execute(&self, name: &str, args: &Value) -> String {
        match self.dispatch(name, args).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Tool {} failed: {}", name, e);
                format!("{} {}", ERROR_PREFIX, e)
            }
        }
    }

    async fn dispatch(&self, name: &str, args: &Value) -> ToolResult<String> {
        let kind: ToolKind = name.parse()?;
        match kind {
            ToolKind::ReadFile => fs::read_file(&self.sandbox, required_str(args, "path")?).await,
            ToolKind::WriteFile => {
                fs::write_file(
                    &self.sandbox,
                    required_str(args, "path")?,
                    required_str(args, "content")?,
                )
                .await
            }
            ToolKind::EditFile => {
                fs::edit_file(
                    &self.sandbox,
                    required_str(args, "path")?,
                    required_str(args, "old_string")?,
                    required_str(args, "new_string")?,
                )
                .await
            }
            ToolKind::ListDir => {
                let path = optional_str(args, "path").unwrap_or(".");
                fs::list_dir(&self.sandbox, path, self.limits.list_dir_max_entries).await
            }
            ToolKind::RunBash => {
                let command = required_str(args, "command")?;
                let requested = args.get("timeout").and_then(Value::as_u64);
                terminal::run_bash(&self.sandbox, command, requested, &self.limits).await
            }
            ToolKind::Glob => {
                search::glob_files(
                    &self.sandbox,
                    required_str(args, "pattern")?,
                    self.limits.glob_max_results,
                )
                .await
            }
            ToolKind::Grep => {
                let pattern = required_str(args, "pattern")?;
                let path = optional_str(args, "path").unwrap_or(".");
                search::grep(&self.sandbox, pattern, path, &self.limits).await
            }
            ToolKind::WebSearch => {
                let query = required_str(args, "query")?;
                Ok(web::web_search(self.search.as_ref(), query, &self.search_config).await)
            }
        }
    }
}

fn required_str<'a>(args: &'a Value, key: &'static str) -> ToolResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or(ToolError::MissingArgument(key))
}

fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize, marker: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}{}", &text[..idx], marker),
        None => text.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    pub struct EchoSearch;

    #[async_trait]
    impl SearchProvider for EchoSearch {
        async fn search(
            &self,
            query: &str,
            max_results: usize,
            _max_response_tokens: usize,
        ) -> anyhow::Result<String> {
            Ok(format!("results for {} (max {})", query, max_results))
        }
    }

    pub fn executor() -> (TempDir, ToolExecutor) {
        let dir = TempDir::new().unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();
        let executor = ToolExecutor::new(
            sandbox,
            ToolLimits::default(),
            Arc::new(EchoSearch),
            SearchConfig::default(),
        );
        (dir, executor)
    }
}
