//! Runs algorithm images on a Docker daemon.

use std::fs::File;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::Instrument;

use crate::backend::command::{format_command_error, run_captured, shell_quote, CommandOutput};
use crate::backend::{callback_urls, Backend, Completion};
use crate::config::DockerConfig;
use crate::error::ExecutionError;
use crate::params::ParamValue;
use crate::process::Process;
use crate::storage::filesystem;

pub struct DockerBackend {
    config: DockerConfig,
    max_output: usize,
}

impl DockerBackend {
    pub fn new(config: DockerConfig, max_output: usize) -> Self {
        Self { config, max_output }
    }

    fn docker(&self) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        if let Some(host) = &self.config.host {
            cmd.arg("-H").arg(host);
        }
        cmd.stdin(Stdio::null());
        cmd
    }

    async fn remove_container(&self, container: &str, force: bool) -> Result<CommandOutput, ExecutionError> {
        let mut cmd = self.docker();
        cmd.arg("rm");
        if force {
            cmd.arg("-f");
        }
        cmd.arg(container)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        run_captured(cmd, self.max_output).await
    }

    /// Shell command run inside the container.
    pub fn container_command(&self, process: &Process, result_url: &str, error_url: &str) -> String {
        let mut tokens = vec![
            self.config.entry_script.clone(),
            shell_quote(result_url),
            shell_quote(error_url),
        ];
        for (_, value) in &process.matched_parameters {
            match value {
                ParamValue::Data(item) => tokens.push(shell_quote(&item.url)),
                ParamValue::Highlighter(encoded) => {
                    tokens.extend(encoded.split_whitespace().map(str::to_string))
                }
                ParamValue::Literal(v) => tokens.push(shell_quote(v)),
            }
        }
        tokens.join(" ")
    }
}

fn create_log(path: &std::path::Path) -> Result<File, ExecutionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    File::create(path).map_err(|e| ExecutionError::WriteJobFile {
        path: path.to_path_buf(),
        source: e,
    })
}

#[async_trait]
impl Backend for DockerBackend {
    async fn execute(&self, process: &Process) -> Result<Completion, ExecutionError> {
        let image = process.image_name.as_deref().ok_or(ExecutionError::MissingImage)?;
        let token = process.token().ok_or(ExecutionError::NotStarted)?;
        let (result_url, error_url) = callback_urls(process)?;

        let container = format!("diva-{}", token);
        let command = self.container_command(process, result_url, error_url);

        let std_log = create_log(&process.log_files.std)?;
        let err_log = create_log(&process.log_files.err)?;

        let mut cmd = self.docker();
        cmd.args([
            "run",
            "--name",
            container.as_str(),
            "--entrypoint",
            self.config.shell.as_str(),
            image,
            "-c",
            command.as_str(),
        ])
            .stdout(Stdio::from(std_log))
            .stderr(Stdio::from(err_log));

        log::info!("Starting container {} from {}", container, image);
        let output = run_captured(cmd, self.max_output)
            .instrument(tracing::info_span!("docker_run", container = %container, image = %image))
            .await?;

        if !output.success() {
            match self.remove_container(&container, true).await {
                Ok(rm) if !rm.success() => {
                    log::warn!("Failed to remove container {}: {}", container, format_command_error(&rm))
                }
                Err(e) => log::warn!("Failed to remove container {}: {}", container, e),
                Ok(_) => {}
            }
            return Err(ExecutionError::ContainerFailed {
                container,
                code: output.exit_code,
            });
        }

        if filesystem::is_empty_file(&process.log_files.err) {
            if let Err(e) = filesystem::remove_file_if_exists(&process.log_files.err) {
                log::warn!("{}", e);
            }
        }

        let rm = self.remove_container(&container, false).await?;
        if !rm.success() {
            log::warn!("Failed to remove container {}: {}", container, format_command_error(&rm));
        }

        Ok(Completion::Detached)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::DockerConfig;
    use crate::params::DataItem;
    use crate::test_support::{fake_binary, layout_in, planned_process};
    use tempfile::TempDir;

    fn started(process: &mut Process) {
        process.id = Some("tok".into());
        process.image_name = Some("diva/otsu:1".into());
        process.remote_result_url = Some("http://diva.test/jobs/17/tok".into());
        process.remote_error_url = Some("http://diva.test/jobs/17/tok/error".into());
    }

    fn backend(dir: &std::path::Path, run_exit: i32) -> (DockerBackend, std::path::PathBuf) {
        let log = dir.join("docker.log");
        let body = format!(
            "echo \"$@\" >> {log}\nif [ \"$1\" = run ]; then echo started; exit {code}; fi",
            log = log.display(),
            code = run_exit
        );
        let binary = fake_binary(dir, "docker", &body);
        let config = DockerConfig {
            binary: binary.to_string_lossy().into_owned(),
            ..DockerConfig::default()
        };
        (DockerBackend::new(config, 4096), log)
    }

    #[test]
    fn test_container_command() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(dir.path());
        let mut process = planned_process(&layout, "file");
        process.matched_parameters = vec![
            (
                "inputImage".into(),
                ParamValue::Data(DataItem {
                    collection: Some("scans".into()),
                    filename: "a.png".into(),
                    path: "/data/files/scans/original/a.png".into(),
                    url: "http://diva.test/files/scans/original/a.png".into(),
                }),
            ),
            ("highlighter".into(), ParamValue::Highlighter("1 2 3".into())),
            ("name".into(), ParamValue::Literal("it's".into())),
        ];
        let (backend, _) = backend(dir.path(), 0);

        assert_eq!(
            backend.container_command(&process, "http://r", "http://e"),
            "./script.sh 'http://r' 'http://e' 'http://diva.test/files/scans/original/a.png' 1 2 3 'it'\\''s'"
        );
    }

    #[tokio::test]
    async fn test_successful_run_removes_container_and_empty_err_log() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(dir.path());
        let mut process = planned_process(&layout, "file");
        started(&mut process);
        let (backend, log) = backend(dir.path(), 0);

        let completion = backend.execute(&process).await.unwrap();
        assert_eq!(completion, Completion::Detached);

        let calls = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert!(lines[0].starts_with("run --name diva-tok --entrypoint /bin/sh diva/otsu:1 -c ./script.sh"));
        assert_eq!(lines[1], "rm diva-tok");
        assert_eq!(
            std::fs::read_to_string(&process.log_files.std).unwrap(),
            "started\n"
        );
        assert!(!process.log_files.err.exists());
    }

    #[tokio::test]
    async fn test_failed_run_force_removes_container() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(dir.path());
        let mut process = planned_process(&layout, "file");
        started(&mut process);
        let (backend, log) = backend(dir.path(), 3);

        let err = backend.execute(&process).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::ContainerFailed { ref container, code: 3 } if container == "diva-tok"
        ));
        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().last(), Some("rm -f diva-tok"));
    }

    #[tokio::test]
    async fn test_missing_image() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(dir.path());
        let mut process = planned_process(&layout, "file");
        started(&mut process);
        process.image_name = None;
        let (backend, log) = backend(dir.path(), 0);

        assert!(matches!(
            backend.execute(&process).await,
            Err(ExecutionError::MissingImage)
        ));
        assert!(!log.exists());
    }
}
