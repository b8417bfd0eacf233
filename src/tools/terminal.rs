//! Shell command execution tool.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::{truncate_chars, ToolError, ToolResult};
use crate::config::ToolLimits;
use crate::sandbox::Sandbox;

/// Run `command` with `sh -c` inside the sandbox root.
///
/// The effective timeout is `min(requested, bash_max_timeout_secs)`. On
/// timeout the whole process group is killed.
pub async fn run_bash(
    sandbox: &Sandbox,
    command: &str,
    requested_timeout: Option<u64>,
    limits: &ToolLimits,
) -> ToolResult<String> {
    let cwd = sandbox.resolve(".")?;
    let timeout_secs = requested_timeout
        .unwrap_or(limits.bash_default_timeout_secs)
        .min(limits.bash_max_timeout_secs)
        .max(1);

    tracing::info!("Executing command (timeout {}s): {}", timeout_secs, command);

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(&cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd
        .spawn()
        .map_err(|e| ToolError::io("Failed to execute command", e))?;
    let pid = child.id();

    let output = match tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        child.wait_with_output(),
    )
    .await
    {
        Ok(result) => result.map_err(|e| ToolError::io("Failed to execute command", e))?,
        Err(_) => {
            kill_process_group(pid);
            tracing::warn!("Command timed out after {}s: {}", timeout_secs, command);
            return Err(ToolError::Timeout(timeout_secs));
        }
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }
    let combined = truncate_chars(
        &combined,
        limits.max_output_chars,
        "\n... [output truncated]",
    );

    if output.status.success() {
        if combined.is_empty() {
            Ok("(no output)".to_string())
        } else {
            Ok(combined)
        }
    } else {
        let code = output.status.code().unwrap_or(-1);
        Ok(format!("Exit code: {}\n{}", code, combined))
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: signalling a process group we created; failure is harmless.
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
