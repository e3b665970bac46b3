//! Child process helpers shared by the tool adapters.

use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

use super::ToolError;

/// Captured result of a finished child process
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    /// Last non-empty stderr line, or the exit status when stderr is silent
    pub fn failure_summary(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("exited with {}", self.status))
    }
}

/// A `tokio::process::Command` that never inherits stdin and dies with its handle.
pub fn tokio_command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    cmd.stdin(Stdio::null()).kill_on_drop(true);
    cmd
}

/// Run `command` to completion, killing it when `timeout` elapses.
pub async fn run_command(
    tool: &str,
    command: &mut Command,
    timeout: Option<Duration>,
) -> Result<CommandOutput, ToolError> {
    let start = Instant::now();

    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let child = command
        .spawn()
        .map_err(|e| ToolError::failed(tool, format!("failed to spawn: {}", e)))?;

    let output = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => result,
            Err(_) => {
                // Dropping the future drops the child, and kill_on_drop reaps it.
                warn!(tool, timeout_secs = limit.as_secs(), "Tool timed out");
                return Err(ToolError::Timeout {
                    tool: tool.to_string(),
                    secs: limit.as_secs(),
                });
            }
        },
        None => child.wait_with_output().await,
    }
    .map_err(|e| ToolError::failed(tool, format!("failed to wait: {}", e)))?;

    let result = CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration: start.elapsed(),
    };

    for line in result.stderr.lines().filter(|l| !l.trim().is_empty()) {
        debug!(tool, "stderr: {}", line);
    }
    debug!(
        tool,
        status = %result.status,
        elapsed_ms = result.duration.as_millis() as u64,
        "Tool finished"
    );

    Ok(result)
}
