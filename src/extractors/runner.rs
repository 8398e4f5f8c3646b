use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::{Result, Yt2SampError};

/// Captured output of a process that exited on its own
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// How a bounded process run ended
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Exited(CommandOutput),
    /// Killed after exceeding the wall-clock limit
    TimedOut,
}

/// Runs an external program to completion or until the timeout fires.
///
/// Callers never see process handles; a timed-out child is killed before `run` returns.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<CommandOutcome>;
}

/// `tokio::process` backed runner
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<CommandOutcome> {
        tracing::debug!(program, ?args, "Spawning external command");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Yt2SampError::ToolLaunch {
                program: program.to_string(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, and kill_on_drop kills it
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                Ok(CommandOutcome::Exited(CommandOutput {
                    success: output.status.success(),
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                }))
            }
            Err(_) => {
                tracing::warn!(program, timeout_secs = timeout.as_secs(), "External command timed out, killed");
                Ok(CommandOutcome::TimedOut)
            }
        }
    }
}
