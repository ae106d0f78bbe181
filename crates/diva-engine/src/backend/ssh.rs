//! Non-interactive `ssh`/`scp` sessions to a remote host.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::backend::command::{format_command_error, run_captured, shell_quote, CommandOutput};
use crate::config::SshConfig;
use crate::error::ExecutionError;

#[derive(Debug, Clone)]
pub struct SshSession {
    config: SshConfig,
    max_output: usize,
}

impl SshSession {
    pub fn new(config: SshConfig, max_output: usize) -> Self {
        Self { config, max_output }
    }

    /// `user@host`
    pub fn target(&self) -> String {
        format!("{}@{}", self.config.user, self.config.host)
    }

    fn common_options(&self, cmd: &mut Command, port_flag: &str) {
        cmd.args(["-o", "BatchMode=yes"]);
        if let Some(port) = self.config.port {
            cmd.arg(port_flag).arg(port.to_string());
        }
        if let Some(identity) = &self.config.identity_file {
            cmd.arg("-i").arg(identity);
        }
    }

    /// An `ssh` invocation running `remote_command`, stdio not yet configured.
    pub fn command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new(&self.config.ssh_binary);
        self.common_options(&mut cmd, "-p");
        cmd.arg(self.target()).arg(remote_command);
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Runs `remote_command`; a non-zero exit is an error.
    pub async fn exec(&self, remote_command: &str) -> Result<CommandOutput, ExecutionError> {
        let mut cmd = self.command(remote_command);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        log::debug!("ssh {}: {}", self.target(), remote_command);
        let output = run_captured(cmd, self.max_output).await?;
        if !output.success() {
            return Err(ExecutionError::Ssh {
                target: self.target(),
                message: format_command_error(&output),
            });
        }
        Ok(output)
    }

    pub async fn upload(&self, local: &Path, remote: &str) -> Result<(), ExecutionError> {
        let mut cmd = Command::new(&self.config.scp_binary);
        self.common_options(&mut cmd, "-P");
        cmd.arg(local)
            .arg(format!("{}:{}", self.target(), remote))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        log::debug!("scp {} -> {}:{}", local.display(), self.target(), remote);
        let output = run_captured(cmd, self.max_output).await?;
        if !output.success() {
            return Err(ExecutionError::Ssh {
                target: self.target(),
                message: format_command_error(&output),
            });
        }
        Ok(())
    }

    pub async fn mkdir_p(&self, remote_dir: &str) -> Result<(), ExecutionError> {
        self.exec(&format!("mkdir -p {}", shell_quote(remote_dir)))
            .await
            .map(|_| ())
    }

    pub async fn remove_dir(&self, remote_dir: &str) -> Result<(), ExecutionError> {
        self.exec(&format!("rm -rf {}", shell_quote(remote_dir)))
            .await
            .map(|_| ())
    }
}
