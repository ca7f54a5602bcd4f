// ABOUTME: Runs a shell command inside a container and classifies its exit status.
// ABOUTME: Exit 75 asks to skip the update; a timeout skips it too and carries the cause.

use super::{Engine, EngineError};
use crate::runtime::Runtime;
use crate::types::ContainerId;
use std::fmt;
use std::time::Duration;

/// Exit code a command uses to ask for the update to be skipped (`EX_TEMPFAIL`).
pub const EX_TEMPFAIL: i64 = 75;

/// Reported when the engine has no exit code for a finished command.
pub const UNKNOWN_EXIT_CODE: i64 = -1;

const EXEC_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How a lifecycle command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Success,
    /// Exit code 75.
    TempFail,
    Failed { exit_code: i64, output: String },
    TimedOut(Duration),
}

impl ExecOutcome {
    /// True when the container's update must not go ahead.
    pub fn skip_update(&self) -> bool {
        matches!(self, ExecOutcome::TempFail | ExecOutcome::TimedOut(_))
    }

    /// True for outcomes that should be reported as an error.
    pub fn is_error(&self) -> bool {
        matches!(self, ExecOutcome::Failed { .. } | ExecOutcome::TimedOut(_))
    }
}

impl fmt::Display for ExecOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecOutcome::Success => write!(f, "command succeeded"),
            ExecOutcome::TempFail => write!(
                f,
                "command exited with code {} (EX_TEMPFAIL), skipping update",
                EX_TEMPFAIL
            ),
            ExecOutcome::Failed { exit_code, output } if output.is_empty() => {
                write!(f, "command exited with code {}", exit_code)
            }
            ExecOutcome::Failed { exit_code, output } => {
                write!(f, "command exited with code {}: {}", exit_code, output)
            }
            ExecOutcome::TimedOut(after) => write!(
                f,
                "command timed out after {}",
                humantime::format_duration(*after)
            ),
        }
    }
}

impl<R: Runtime> Engine<R> {
    /// Executes `sh -c <command>` in the container, waiting at most `timeout`
    /// (`None` waits until the command exits).
    pub async fn exec(
        &self,
        id: &ContainerId,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecOutcome, EngineError> {
        let run = self.run_to_completion(id, command);
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(container = %id.short_id(), command = %command, "Command timed out");
                    Ok(ExecOutcome::TimedOut(limit))
                }
            },
            None => run.await,
        }
    }

    async fn run_to_completion(
        &self,
        id: &ContainerId,
        command: &str,
    ) -> Result<ExecOutcome, EngineError> {
        let cmd = vec!["sh".to_string(), "-c".to_string(), command.to_string()];
        let exec_id = self.runtime.exec_create(id, &cmd).await?;
        let output = self.runtime.exec_start(&exec_id).await?;
        let output = output.trim().to_string();

        loop {
            let info = self.runtime.exec_inspect(&exec_id).await?;
            tracing::debug!(exec = %exec_id, running = info.running, exit_code = ?info.exit_code, "Awaiting timeout or completion");
            if info.running {
                tokio::time::sleep(EXEC_POLL_INTERVAL).await;
                continue;
            }

            if !output.is_empty() {
                tracing::info!(container = %id.short_id(), "Command output:\n{}", output);
            }

            return Ok(match info.exit_code {
                Some(0) => ExecOutcome::Success,
                Some(EX_TEMPFAIL) => ExecOutcome::TempFail,
                Some(exit_code) => ExecOutcome::Failed { exit_code, output },
                None => {
                    tracing::warn!(exec = %exec_id, "Command finished without an exit code");
                    ExecOutcome::Failed {
                        exit_code: UNKNOWN_EXIT_CODE,
                        output,
                    }
                }
            });
        }
    }
}
