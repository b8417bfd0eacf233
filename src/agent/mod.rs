//! Agent module - the delegated task loop.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Build context with system prompt, project context and the task prompt
//! 2. Call the model with the tool schema (retrying transient failures)
//! 3. If the model requests tool calls, execute them in order and feed results back
//! 4. Repeat until the model answers, the deadline passes, or iterations run out

mod agent_loop;
mod prompt;
pub mod state;
mod types;

pub use agent_loop::Agent;
pub use prompt::build_system_prompt;
pub use types::{AgentResult, ErrorKind, Task};
