//! Runs executables as child processes of the engine.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::backend::command::{format_command_error, run_captured};
use crate::backend::{Backend, Completion, ProcessOutput};
use crate::config::LocalConfig;
use crate::error::ExecutionError;
use crate::process::Process;
use crate::result::ResultHandler;
use crate::services::ExecutableType;

pub struct LocalBackend {
    max_buffer_bytes: usize,
}

impl LocalBackend {
    pub fn new(config: &LocalConfig) -> Self {
        Self {
            max_buffer_bytes: config.max_buffer_bytes,
        }
    }
}

fn interpreter(executable_type: ExecutableType) -> &'static [&'static str] {
    match executable_type {
        ExecutableType::Java => &["java", "-Djava.awt.headless=true", "-Xmx4096m", "-jar"],
        ExecutableType::Coffeescript => &["coffee"],
        ExecutableType::Python => &["python"],
        ExecutableType::Rscript => &["Rscript"],
        ExecutableType::Bash | ExecutableType::Matlab | ExecutableType::Binary => &[],
    }
}

/// Program and arguments for `process`: interpreter prefix, executable,
/// ordered parameters.
pub fn command_line(process: &Process) -> (String, Vec<String>) {
    let executable = process.executable_path.to_string_lossy().into_owned();
    let (program, mut args) = match interpreter(process.executable_type) {
        [] => (executable, Vec::new()),
        [program, flags @ ..] => {
            let mut args: Vec<String> = flags.iter().map(|s| s.to_string()).collect();
            args.push(executable);
            (program.to_string(), args)
        }
    };
    for (_, value) in &process.matched_parameters {
        args.extend(value.local_args());
    }
    (program, args)
}

#[async_trait]
impl Backend for LocalBackend {
    async fn execute(&self, process: &Process) -> Result<Completion, ExecutionError> {
        let (program, args) = command_line(process);
        let console = process.result_handler == ResultHandler::Console;

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stderr(Stdio::piped());
        if let Some(dir) = process.executable_path.parent().filter(|d| d.is_dir()) {
            cmd.current_dir(dir);
        }

        if console {
            let tmp = std::fs::File::create(&process.tmp_result_file).map_err(|e| {
                ExecutionError::WriteJobFile {
                    path: process.tmp_result_file.clone(),
                    source: e,
                }
            })?;
            cmd.stdout(Stdio::from(tmp));
        } else {
            cmd.stdout(Stdio::piped());
        }

        log::info!("Executing {} for {}/{}", program, process.root_folder, process.method_folder);
        log::debug!("Command line: {} {}", program, args.join(" "));

        let output = run_captured(cmd, self.max_buffer_bytes).await?;

        if !output.success() {
            return Err(ExecutionError::NonZeroExit {
                code: output.exit_code,
                stderr: format_command_error(&output),
            });
        }

        if console {
            if let Some(result_file) = &process.result_file {
                tokio::fs::rename(&process.tmp_result_file, result_file).await?;
            }
        }

        Ok(Completion::Finished(ProcessOutput::from(output)))
    }
}
