//! Loop state machine and partial-progress extraction.
//!
//! The loop in [`super::Agent::run`] performs I/O and reports what happened as
//! a [`LoopEvent`]; [`transition`] decides the next [`LoopState`] without
//! touching the network or the filesystem.

use super::types::ErrorKind;
use crate::llm::{ChatMessage, Role};
use crate::tools::{truncate_chars, ERROR_PREFIX};

/// Entries kept in a partial-progress summary.
const PROGRESS_ENTRIES: usize = 5;
/// Characters kept per partial-progress entry.
const PROGRESS_ENTRY_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    /// About to run the 0-based `iteration`.
    Running { iteration: u32 },
    Done { content: String, iterations_used: u32 },
    TimedOut { iterations_used: u32 },
    IterationsExhausted { iterations_used: u32 },
    ApiError {
        kind: ErrorKind,
        message: String,
        iterations_used: u32,
    },
}

impl LoopState {
    /// Starting state for a budget of `max_iterations`.
    pub fn initial(max_iterations: u32) -> Self {
        if max_iterations == 0 {
            Self::IterationsExhausted { iterations_used: 0 }
        } else {
            Self::Running { iteration: 0 }
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running { .. })
    }
}

/// Outcome of one step of the running loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// The wall-clock budget was exceeded before the iteration began.
    DeadlineExceeded,
    /// The completion call failed after retries.
    ModelFailed { message: String },
    /// The model answered without requesting tools.
    FinalAnswer { content: String },
    /// The model requested tools and all of them were executed.
    ToolsExecuted,
}

/// Next state after `event` happened while in `state`.
///
/// Terminal states absorb every event.
pub fn transition(state: LoopState, event: LoopEvent, max_iterations: u32) -> LoopState {
    let iteration = match state {
        LoopState::Running { iteration } => iteration,
        terminal => return terminal,
    };

    match event {
        LoopEvent::DeadlineExceeded => LoopState::TimedOut {
            iterations_used: iteration,
        },
        LoopEvent::ModelFailed { message } => LoopState::ApiError {
            kind: ErrorKind::from_api_error(&message),
            message,
            iterations_used: iteration,
        },
        LoopEvent::FinalAnswer { content } => LoopState::Done {
            content,
            iterations_used: iteration + 1,
        },
        LoopEvent::ToolsExecuted => {
            let next = iteration + 1;
            if next >= max_iterations {
                LoopState::IterationsExhausted {
                    iterations_used: next,
                }
            } else {
                LoopState::Running { iteration: next }
            }
        }
    }
}

/// Summarize the most recent assistant text and successful tool output.
pub fn partial_progress(conversation: &[ChatMessage]) -> Option<String> {
    let entries: Vec<String> = conversation
        .iter()
        .filter_map(|msg| {
            let content = msg.content.as_deref()?.trim();
            if content.is_empty() {
                return None;
            }
            match msg.role {
                Role::Assistant => Some(format!(
                    "[assistant] {}",
                    truncate_chars(content, PROGRESS_ENTRY_CHARS, "...")
                )),
                Role::Tool if !content.starts_with(ERROR_PREFIX) => Some(format!(
                    "[tool] {}",
                    truncate_chars(content, PROGRESS_ENTRY_CHARS, "...")
                )),
                _ => None,
            }
        })
        .collect();

    if entries.is_empty() {
        return None;
    }
    let start = entries.len().saturating_sub(PROGRESS_ENTRIES);
    Some(entries[start..].join("\n\n"))
}
