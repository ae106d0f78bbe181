//! Subprocess helpers shared by the backends.

use std::process::ExitStatus;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::ExecutionError;

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Escapes a token for safe use in single-quoted shell strings.
/// Replaces single quotes with '\'' (end quote, escaped quote, start quote).
pub fn shell_escape_token(token: &str) -> String {
    token.replace('\'', "'\\''")
}

/// Single-quotes `token` for a remote shell.
pub fn shell_quote(token: &str) -> String {
    format!("'{}'", shell_escape_token(token))
}

pub fn shell_join<I, S>(tokens: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tokens
        .into_iter()
        .map(|t| shell_quote(t.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Formats a command failure with both stdout and stderr.
pub fn format_command_error(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    let stdout = output.stdout.trim();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => format!("Command failed with exit code {}", output.exit_code),
        (true, false) => stdout.to_string(),
        (false, true) => stderr.to_string(),
        (false, false) => format!("{}\n{}", stderr, stdout),
    }
}

pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

async fn read_bounded<R>(pipe: Option<R>, limit: usize) -> Result<Vec<u8>, ExecutionError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        pipe.take(limit as u64 + 1).read_to_end(&mut buf).await?;
    }
    if buf.len() > limit {
        return Err(ExecutionError::OutputLimitExceeded { limit });
    }
    Ok(buf)
}

/// Spawns `cmd` and waits for it. Streams the caller configured as piped are
/// captured up to `limit` bytes each; going over kills the child.
pub async fn run_captured(mut cmd: Command, limit: usize) -> Result<CommandOutput, ExecutionError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| ExecutionError::Spawn {
        program: program.clone(),
        source: e,
    })?;

    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let captured = tokio::try_join!(
        read_bounded(stdout_pipe, limit),
        read_bounded(stderr_pipe, limit)
    );

    let (stdout, stderr) = match captured {
        Ok(streams) => streams,
        Err(e) => {
            log::warn!("Killing '{}': {}", program, e);
            if let Err(kill_err) = child.kill().await {
                log::warn!("Failed to kill '{}': {}", program, kill_err);
            }
            return Err(e);
        }
    };

    let status = child.wait().await?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: exit_code(status),
    })
}
