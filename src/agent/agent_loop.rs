//! Core agent loop implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::llm::retry::RetryPolicy;
use crate::llm::{ChatMessage, ChatResponse, LlmClient, LlmError, OpenRouterClient, ToolCall, ToolSchema};
use crate::sandbox::Sandbox;
use crate::tools::{self, BraveSearch, DisabledSearch, SearchProvider, ToolExecutor};

use super::prompt::{build_system_prompt, load_project_context};
use super::state::{partial_progress, transition, LoopEvent, LoopState};
use super::types::{AgentResult, ErrorKind, Task};

/// The delegated agent.
pub struct Agent {
    config: Config,
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn SearchProvider>,
    retry: RetryPolicy,
}

impl Agent {
    /// Create an agent talking to the configured completion endpoint.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let llm = Arc::new(OpenRouterClient::new(&config.llm)?);
        let search: Arc<dyn SearchProvider> = match config.search.brave_api_key.as_deref() {
            Some(key) if config.search.is_enabled() => Arc::new(BraveSearch::new(key)?),
            _ => Arc::new(DisabledSearch),
        };
        Ok(Self::with_clients(config, llm, search))
    }

    /// Create an agent with explicit collaborators.
    pub fn with_clients(
        config: Config,
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn SearchProvider>,
    ) -> Self {
        let retry = RetryPolicy::new(config.agent.retry_attempts);
        Self {
            config,
            llm,
            search,
            retry,
        }
    }

    /// Override the retry policy (tests use a zero delay).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run a task to completion. Every outcome is reported in the result.
    pub async fn run(&self, task: &Task) -> AgentResult {
        if !self.config.agent.is_model_allowed(task.model()) {
            tracing::warn!("Rejected task for model {}", task.model());
            return AgentResult::failed(
                ErrorKind::Unknown,
                format!(
                    "Model '{}' is not allowed. Allowed models: {}",
                    task.model(),
                    self.config.agent.allowed_models.join(", ")
                ),
                0,
                Vec::new(),
                None,
            );
        }

        let sandbox = match Sandbox::new(task.working_dir()) {
            Ok(sandbox) => sandbox,
            Err(e) => {
                tracing::warn!("Rejected task: {}", e);
                return AgentResult::failed(ErrorKind::Unknown, e.to_string(), 0, Vec::new(), None);
            }
        };

        let context = load_project_context(&sandbox, &self.config.agent.context_file).await;
        let system_prompt =
            build_system_prompt(&sandbox.root().to_string_lossy(), context.as_deref());
        let executor = ToolExecutor::new(
            sandbox,
            self.config.tools.clone(),
            Arc::clone(&self.search),
            self.config.search.clone(),
        );

        let mut run = Run {
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(task.prompt())],
            tools_called: Vec::new(),
        };
        let schemas = tools::tool_schemas();
        let deadline = Duration::from_secs(task.timeout_seconds());
        let started = Instant::now();

        tracing::info!(
            "Starting task: model={} max_iterations={} timeout={}s",
            task.model(),
            task.max_iterations(),
            task.timeout_seconds()
        );

        let mut state = LoopState::initial(task.max_iterations());
        while let LoopState::Running { iteration } = state {
            tracing::debug!("Agent iteration {}", iteration + 1);

            let event = if started.elapsed() > deadline {
                LoopEvent::DeadlineExceeded
            } else {
                let completion = self.complete(task.model(), &run.messages, &schemas).await;
                match completion {
                    Err(e) => LoopEvent::ModelFailed {
                        message: e.to_string(),
                    },
                    Ok(response) => run.apply(response, &executor).await,
                }
            };
            state = transition(state, event, task.max_iterations());
        }

        self.finish(state, task, run)
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        schemas: &[ToolSchema],
    ) -> Result<ChatResponse, LlmError> {
        self.retry
            .run(move || self.llm.chat_completion(model, messages, Some(schemas)))
            .await
    }

    fn finish(&self, state: LoopState, task: &Task, run: Run) -> AgentResult {
        let result = match state {
            LoopState::Done {
                content,
                iterations_used,
            } => AgentResult::completed(content, iterations_used, run.tools_called),
            LoopState::TimedOut { iterations_used } => AgentResult::failed(
                ErrorKind::TaskTimeout,
                format!(
                    "Task timed out after {}s ({} iterations completed)",
                    task.timeout_seconds(),
                    iterations_used
                ),
                iterations_used,
                run.tools_called,
                partial_progress(&run.messages),
            ),
            LoopState::IterationsExhausted { iterations_used } => AgentResult::failed(
                ErrorKind::MaxIterations,
                format!(
                    "Reached maximum iterations ({}) without completing the task",
                    task.max_iterations()
                ),
                iterations_used,
                run.tools_called,
                partial_progress(&run.messages),
            ),
            LoopState::ApiError {
                kind,
                message,
                iterations_used,
            } => AgentResult::failed(
                kind,
                format!("API error: {}", message),
                iterations_used,
                run.tools_called,
                None,
            ),
            LoopState::Running { .. } => unreachable!("loop exits only in a terminal state"),
        };

        match result.error_kind {
            None => tracing::info!(
                "Task completed in {} iterations ({} tool calls)",
                result.iterations_used,
                result.tools_called.len()
            ),
            Some(kind) => tracing::info!(
                "Task ended with {} after {} iterations",
                kind,
                result.iterations_used
            ),
        }
        result
    }
}

/// Mutable state of one run: the conversation and the tools called so far.
struct Run {
    messages: Vec<ChatMessage>,
    tools_called: Vec<String>,
}

impl Run {
    /// Fold a model response into the conversation, executing requested tools in order.
    async fn apply(&mut self, response: ChatResponse, executor: &ToolExecutor) -> LoopEvent {
        let ChatResponse {
            content,
            tool_calls,
        } = response;
        let tool_calls = match tool_calls {
            Some(calls) if !calls.is_empty() => calls,
            _ => {
                return LoopEvent::FinalAnswer {
                    content: content.unwrap_or_default(),
                }
            }
        };

        self.messages
            .push(ChatMessage::assistant(content, tool_calls.clone()));

        let max_chars = executor.limits().tool_result_max_chars;
        for call in &tool_calls {
            let output = execute_tool_call(call, executor).await;
            self.tools_called.push(call.function.name.clone());
            self.messages.push(ChatMessage::tool(
                call.id.clone(),
                tools::truncate_chars(&output, max_chars, "\n... [truncated]"),
            ));
        }
        LoopEvent::ToolsExecuted
    }
}

/// Execute a single tool call. Malformed argument JSON is treated as `{}`.
async fn execute_tool_call(call: &ToolCall, executor: &ToolExecutor) -> String {
    let args = parse_arguments(&call.function.arguments);
    tracing::info!(
        "Calling tool: {} with args: {}",
        call.function.name,
        tools::truncate_chars(&call.function.arguments, 200, "...")
    );
    executor.execute(&call.function.name, &args).await
}

fn parse_arguments(raw: &str) -> serde_json::Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        Ok(_) | Err(_) => {
            if !raw.trim().is_empty() {
                tracing::debug!("Treating malformed tool arguments as empty: {}", raw);
            }
            serde_json::Value::Object(Default::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn malformed_arguments_become_empty_object() {
        assert_eq!(parse_arguments("{\"path\": \"a\"}"), json!({"path": "a"}));
        assert_eq!(parse_arguments("{not json"), json!({}));
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments("[1, 2]"), json!({}));
    }
}
