//! # agent-delegate
//!
//! Lets a host assistant hand a multi-step task to a secondary model that
//! works inside a sandboxed directory.
//!
//! This library provides:
//! - A tool-based agent loop with an iteration budget and a wall-clock deadline
//! - A tool executor (files, shell, glob, grep, web search) confined to one directory
//! - An OpenAI-compatible completion client with bounded retry
//!
//! ## Example
//!
//! ```rust,ignore
//! use agent_delegate::{agent::{Agent, Task}, config::Config};
//!
//! let config = Config::load(None)?;
//! let task = Task::new("Add a unit test for parse()", "/path/to/repo", &config.agent);
//! let agent = Agent::new(config)?;
//! let result = agent.run(&task).await;
//! println!("{}", result.content);
//! ```

pub mod agent;
pub mod config;
pub mod llm;
pub mod sandbox;
pub mod tools;

pub use config::Config;
