//! agent-delegate - command-line entry point.
//!
//! Runs one task and prints the result on stdout. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use agent_delegate::agent::{Agent, Task};
use agent_delegate::config::Config;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "agent-delegate", version, about = "Delegate a task to a sandboxed tool-using model")]
struct Cli {
    /// Task prompt for the delegated model
    prompt: String,

    /// Directory the agent is confined to
    #[arg(short = 'C', long, default_value = ".")]
    working_dir: PathBuf,

    /// Model to use (must be on the allow-list)
    #[arg(short, long)]
    model: Option<String>,

    /// Override the iteration budget
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Override the wall-clock budget, in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_delegate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_deref())?;
    info!("Loaded configuration: default_model={}", config.agent.default_model);

    let working_dir = std::path::absolute(&cli.working_dir)?;
    let mut task = Task::new(cli.prompt, working_dir, &config.agent);
    if let Some(model) = cli.model {
        task = task.with_model(model);
    }
    if let Some(max_iterations) = cli.max_iterations {
        task = task.with_max_iterations(max_iterations);
    }
    if let Some(timeout) = cli.timeout {
        task = task.with_timeout_seconds(timeout);
    }

    let agent = Agent::new(config)?;
    let result = agent.run(&task).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.content);
        if let Some(progress) = &result.partial_progress {
            println!("\n--- partial progress ---\n{}", progress);
        }
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
