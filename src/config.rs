//! Configuration management for agent-delegate.
//!
//! Configuration is resolved in three layers, lowest precedence first:
//! built-in defaults, an optional YAML file, then environment variables:
//! - `OPENROUTER_API_KEY` - Required to run tasks. API key for the completion endpoint.
//! - `LLM_BASE_URL` - Optional. OpenAI-compatible base URL. Defaults to OpenRouter.
//! - `DEFAULT_MODEL` - Optional. Model used when a task does not name one.
//! - `ALLOWED_MODELS` - Optional. Comma-separated model allow-list.
//! - `MAX_ITERATIONS` - Optional. Maximum agent loop iterations. Defaults to `20`.
//! - `TASK_TIMEOUT_SECONDS` - Optional. Wall-clock budget per task. Defaults to `600`.
//! - `BASH_TIMEOUT_SECONDS` - Optional. Default `run_bash` timeout. Defaults to `30`.
//! - `BASH_MAX_TIMEOUT_SECONDS` - Optional. Ceiling for `run_bash` timeouts. Defaults to `300`.
//! - `TOOL_OUTPUT_MAX_CHARS` - Optional. Truncation budget for tool results fed back to the model.
//! - `BRAVE_API_KEY` - Optional. Enables the `web_search` tool.
//!
//! The core never reads configuration itself; callers resolve a [`Config`]
//! up front and hand it to [`crate::agent::Agent`].

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to read config file {0}: {1}")]
    Read(String, std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Completion endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Bearer token for the completion endpoint
    pub api_key: String,

    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    pub base_url: String,

    /// `max_tokens` sent with every completion request
    pub max_tokens: u32,

    /// Transport-level timeout for a single completion request
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            max_tokens: 4096,
            request_timeout_secs: 120,
        }
    }
}

/// Agent loop configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Models a task is allowed to run against
    pub allowed_models: Vec<String>,

    /// Model used when the task does not specify one
    pub default_model: String,

    /// Maximum iterations for the agent loop
    pub max_iterations: u32,

    /// Wall-clock budget for one task, checked between iterations
    pub timeout_seconds: u64,

    /// Attempts per completion request (including the first)
    pub retry_attempts: u32,

    /// Project context file looked up in the working directory
    pub context_file: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            allowed_models: vec![
                "anthropic/claude-sonnet-4.5".to_string(),
                "anthropic/claude-haiku-4.5".to_string(),
                "openai/gpt-5-mini".to_string(),
                "google/gemini-2.5-flash".to_string(),
            ],
            default_model: "anthropic/claude-sonnet-4.5".to_string(),
            max_iterations: 20,
            timeout_seconds: 600,
            retry_attempts: 3,
            context_file: "AGENTS.md".to_string(),
        }
    }
}

impl AgentConfig {
    /// Whether `model` is on the allow-list.
    pub fn is_model_allowed(&self, model: &str) -> bool {
        self.allowed_models.iter().any(|m| m == model)
    }
}

/// Limits applied by the tool executor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolLimits {
    /// `run_bash` timeout when the model does not request one
    pub bash_default_timeout_secs: u64,

    /// Upper bound on any `run_bash` timeout
    pub bash_max_timeout_secs: u64,

    /// Cap on captured command output
    pub max_output_chars: usize,

    /// Cap on a tool result appended to the conversation
    pub tool_result_max_chars: usize,

    pub glob_max_results: usize,

    pub grep_max_results: usize,

    /// Matching lines longer than this are cut in grep output
    pub grep_line_max_chars: usize,

    /// Files larger than this are not scanned by grep
    pub grep_max_file_bytes: u64,

    pub list_dir_max_entries: usize,
}

impl Default for ToolLimits {
    fn default() -> Self {
        Self {
            bash_default_timeout_secs: 30,
            bash_max_timeout_secs: 300,
            max_output_chars: 50_000,
            tool_result_max_chars: 20_000,
            glob_max_results: 200,
            grep_max_results: 100,
            grep_line_max_chars: 200,
            grep_max_file_bytes: 1024 * 1024,
            list_dir_max_entries: 500,
        }
    }
}

/// Web search collaborator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Brave Search subscription token; search is disabled without it
    pub brave_api_key: Option<String>,

    pub max_results: usize,

    pub max_response_tokens: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            brave_api_key: None,
            max_results: 5,
            max_response_tokens: 1024,
        }
    }
}

impl SearchConfig {
    /// Check if web search is enabled (Brave key configured)
    pub fn is_enabled(&self) -> bool {
        self.brave_api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub tools: ToolLimits,
    pub search: SearchConfig,
}

impl Config {
    /// Load configuration from an optional YAML file and the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if no API key is configured, or any
    /// error from parsing and validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        if config.llm.api_key.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string()));
        }
        Ok(config)
    }

    /// Parse a YAML config file. Missing sections fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Overlay environment variables using the given lookup function.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OPENROUTER_API_KEY") {
            self.llm.api_key = v;
        }
        if let Some(v) = lookup("LLM_BASE_URL") {
            self.llm.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("ALLOWED_MODELS") {
            self.agent.allowed_models = v
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("DEFAULT_MODEL") {
            self.agent.default_model = v.trim().to_string();
        }
        if let Some(v) = lookup("MAX_ITERATIONS") {
            self.agent.max_iterations = parse_number("MAX_ITERATIONS", &v)?;
        }
        if let Some(v) = lookup("TASK_TIMEOUT_SECONDS") {
            self.agent.timeout_seconds = parse_number("TASK_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = lookup("BASH_TIMEOUT_SECONDS") {
            self.tools.bash_default_timeout_secs = parse_number("BASH_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = lookup("BASH_MAX_TIMEOUT_SECONDS") {
            self.tools.bash_max_timeout_secs = parse_number("BASH_MAX_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = lookup("TOOL_OUTPUT_MAX_CHARS") {
            self.tools.tool_result_max_chars = parse_number("TOOL_OUTPUT_MAX_CHARS", &v)?;
        }
        if let Some(v) = lookup("BRAVE_API_KEY") {
            self.search.brave_api_key = Some(v);
        }
        Ok(())
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.allowed_models.is_empty() {
            return Err(ConfigError::InvalidValue(
                "allowed_models".to_string(),
                "allow-list must not be empty".to_string(),
            ));
        }
        if !self.agent.is_model_allowed(&self.agent.default_model) {
            return Err(ConfigError::InvalidValue(
                "default_model".to_string(),
                format!("{} is not in the allow-list", self.agent.default_model),
            ));
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "max_iterations".to_string(),
                "must be positive".to_string(),
            ));
        }
        if self.agent.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "timeout_seconds".to_string(),
                "must be positive".to_string(),
            ));
        }
        if self.tools.bash_max_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "bash_max_timeout_secs".to_string(),
                "must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tools.max_output_chars, 50_000);
        assert_eq!(config.agent.retry_attempts, 3);
    }

    #[test]
    fn yaml_overrides_only_named_fields() {
        let config = Config::from_yaml_str(
            r#"
agent:
  max_iterations: 7
tools:
  grep_max_results: 10
"#,
        )
        .unwrap();
        assert_eq!(config.agent.max_iterations, 7);
        assert_eq!(config.agent.timeout_seconds, 600);
        assert_eq!(config.tools.grep_max_results, 10);
        assert_eq!(config.tools.glob_max_results, 200);
    }

    #[test]
    fn empty_yaml_is_default() {
        let config = Config::from_yaml_str("  \n").unwrap();
        assert_eq!(config.agent.max_iterations, 20);
    }

    #[test]
    fn env_overrides_yaml() {
        let mut config = Config::from_yaml_str("agent:\n  max_iterations: 7\n").unwrap();
        config
            .apply_env(env(&[
                ("MAX_ITERATIONS", "3"),
                ("ALLOWED_MODELS", "a/one, b/two ,"),
                ("DEFAULT_MODEL", "b/two"),
                ("OPENROUTER_API_KEY", "sk-test"),
            ]))
            .unwrap();
        assert_eq!(config.agent.max_iterations, 3);
        assert_eq!(config.agent.allowed_models, vec!["a/one", "b/two"]);
        assert_eq!(config.llm.api_key, "sk-test");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unparsable_number_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("TASK_TIMEOUT_SECONDS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "TASK_TIMEOUT_SECONDS"));
    }

    #[test]
    fn default_model_must_be_allowed() {
        let mut config = Config::default();
        config.agent.default_model = "someone/else".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(key, _)) if key == "default_model"
        ));
    }

    #[test]
    fn zero_budgets_are_rejected() {
        let mut config = Config::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.agent.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn search_enabled_needs_non_blank_key() {
        let mut search = SearchConfig::default();
        assert!(!search.is_enabled());
        search.brave_api_key = Some("  ".to_string());
        assert!(!search.is_enabled());
        search.brave_api_key = Some("key".to_string());
        assert!(search.is_enabled());
    }
}
