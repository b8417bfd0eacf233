//! Task input and result types.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::AgentConfig;

/// One delegated task. Built once per run and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Task {
    prompt: String,
    working_dir: PathBuf,
    model: String,
    max_iterations: u32,
    timeout_seconds: u64,
}

impl Task {
    /// Create a task using the configured model and budgets.
    pub fn new(prompt: impl Into<String>, working_dir: impl Into<PathBuf>, config: &AgentConfig) -> Self {
        Self {
            prompt: prompt.into(),
            working_dir: working_dir.into(),
            model: config.default_model.clone(),
            max_iterations: config.max_iterations,
            timeout_seconds: config.timeout_seconds,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }
}

/// Why a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TaskTimeout,
    MaxIterations,
    RateLimit,
    ApiTimeout,
    NetworkError,
    Unknown,
}

impl ErrorKind {
    /// Classify a completion error by its message.
    pub fn from_api_error(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("rate limit")
            || lower.contains("rate_limit")
            || lower.contains("429")
            || lower.contains("too many requests")
        {
            Self::RateLimit
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::ApiTimeout
        } else if lower.contains("connect") || lower.contains("network") {
            Self::NetworkError
        } else {
            Self::Unknown
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskTimeout => write!(f, "task_timeout"),
            Self::MaxIterations => write!(f, "max_iterations"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::ApiTimeout => write!(f, "api_timeout"),
            Self::NetworkError => write!(f, "network_error"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Terminal record of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentResult {
    pub success: bool,
    pub content: String,
    pub iterations_used: u32,
    pub tools_called: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_progress: Option<String>,
}

impl AgentResult {
    pub fn completed(content: String, iterations_used: u32, tools_called: Vec<String>) -> Self {
        Self {
            success: true,
            content,
            iterations_used,
            tools_called,
            error_kind: None,
            partial_progress: None,
        }
    }

    pub fn failed(
        kind: ErrorKind,
        content: String,
        iterations_used: u32,
        tools_called: Vec<String>,
        partial_progress: Option<String>,
    ) -> Self {
        Self {
            success: false,
            content,
            iterations_used,
            tools_called,
            error_kind: Some(kind),
            partial_progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_defaults_come_from_config() {
        let config = AgentConfig::default();
        let task = Task::new("do it", "/tmp", &config);
        assert_eq!(task.model(), config.default_model);
        assert_eq!(task.max_iterations(), config.max_iterations);
        assert_eq!(task.timeout_seconds(), config.timeout_seconds);

        let task = task.with_model("x/y").with_max_iterations(2).with_timeout_seconds(9);
        assert_eq!(task.model(), "x/y");
        assert_eq!(task.max_iterations(), 2);
        assert_eq!(task.timeout_seconds(), 9);
    }

    #[test]
    fn classifies_api_errors() {
        assert_eq!(ErrorKind::from_api_error("HTTP 429: slow"), ErrorKind::RateLimit);
        assert_eq!(ErrorKind::from_api_error("Rate limit hit"), ErrorKind::RateLimit);
        assert_eq!(ErrorKind::from_api_error("Request timed out: x"), ErrorKind::ApiTimeout);
        assert_eq!(ErrorKind::from_api_error("Connection error: refused"), ErrorKind::NetworkError);
        assert_eq!(ErrorKind::from_api_error("HTTP 401: bad key"), ErrorKind::Unknown);
    }

    #[test]
    fn result_serializes_snake_case() {
        let result = AgentResult::failed(ErrorKind::MaxIterations, "c".into(), 3, vec!["glob".into()], None);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["error_kind"], "max_iterations");
        assert_eq!(value["iterations_used"], 3);
        assert!(value.get("partial_progress").is_none());
        assert_eq!(ErrorKind::TaskTimeout.to_string(), "task_timeout");
    }
}
