//! Subprocess runner for storage tooling

use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::error::{exit_status, CommandError};

/// Captured output of a successful command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external commands with a bounded runtime
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a command and capture its output
    pub async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        debug!(program, ?args, "running command");

        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                CommandError::Other(format!("{} timed out after {:?}", program, self.timeout))
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(CommandError::Exited {
                status: output.status,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }

    /// Run a storage tool, wrapping any failure with the tool's invocation
    pub async fn run_tool(&self, tool: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        self.run(tool, args).await.map_err(|err| {
            let outcome = exit_status(&err);
            warn!(
                tool,
                ?args,
                exit = ?outcome,
                transient = outcome.is_transient(),
                "storage tool failed: {}",
                err
            );
            let output = format!("{} {} failed", tool, args.join(" "));
            err.wrap(output)
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::exec::ExitOutcome;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_run_success() {
        let executor = CommandExecutor::default();
        let output = executor.run("sh", &["-c", "echo ok"]).await.unwrap();
        assert_eq!(output.stdout.trim(), "ok");
    }

    #[tokio::test]
    async fn test_run_exit_code() {
        let executor = CommandExecutor::default();
        let err = executor.run("sh", &["-c", "echo bad >&2; exit 13"]).await.unwrap_err();
        assert_matches!(&err, CommandError::Exited { stderr, .. } if stderr == "bad");
        assert_eq!(exit_status(&err), ExitOutcome::Known(13));
    }

    #[tokio::test]
    async fn test_run_tool_wraps_failure() {
        let executor = CommandExecutor::default();
        let err = executor.run_tool("sh", &["-c", "exit 3"]).await.unwrap_err();
        assert_matches!(&err, CommandError::Tool { .. });
        assert_eq!(exit_status(&err), ExitOutcome::Known(3));
    }

    #[tokio::test]
    async fn test_missing_binary_reports_errno() {
        let executor = CommandExecutor::default();
        let err = executor
            .run("/nonexistent/storage-tool", &[])
            .await
            .unwrap_err();
        // ENOENT
        assert_eq!(exit_status(&err), ExitOutcome::Known(2));
    }

    #[tokio::test]
    async fn test_timeout_is_unknown() {
        let executor = CommandExecutor::new(Duration::from_millis(50));
        let err = executor.run("sleep", &["5"]).await.unwrap_err();
        assert_matches!(err, CommandError::Other(_));
    }
}
