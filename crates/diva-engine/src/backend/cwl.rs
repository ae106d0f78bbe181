//! Docker images run through a CWL runner on a remote host.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

use crate::backend::command::{exit_code, shell_join};
use crate::backend::ssh::SshSession;
use crate::backend::{Backend, Completion};
use crate::config::CwlConfig;
use crate::error::ExecutionError;
use crate::params::ParamValue;
use crate::process::Process;

/// One input binding of a CWL job file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CwlInput {
    File { class: &'static str, path: String },
    Directory { class: &'static str, location: String },
    Int(i64),
    Float(f64),
    String(String),
}

impl CwlInput {
    fn file(path: &Path) -> Self {
        CwlInput::File {
            class: "File",
            path: path.to_string_lossy().into_owned(),
        }
    }

    fn directory(location: &Path) -> Self {
        CwlInput::Directory {
            class: "Directory",
            location: location.to_string_lossy().into_owned(),
        }
    }

    fn scalar(value: &str) -> Self {
        if let Ok(i) = value.parse::<i64>() {
            return CwlInput::Int(i);
        }
        match value.parse::<f64>() {
            Ok(f) if f.is_finite() => CwlInput::Float(f),
            _ => CwlInput::String(value.to_string()),
        }
    }
}

/// Input bindings for `process`'s job file.
pub fn job_inputs(process: &Process) -> BTreeMap<String, CwlInput> {
    let mut inputs = BTreeMap::new();
    for (name, value) in &process.matched_parameters {
        let input = match value {
            _ if name == "outputFolder" => CwlInput::directory(&process.output_folder),
            ParamValue::Data(item) => CwlInput::file(&item.path),
            ParamValue::Highlighter(encoded) => CwlInput::String(encoded.clone()),
            ParamValue::Literal(v) => CwlInput::scalar(v),
        };
        inputs.insert(name.clone(), input);
    }
    inputs.insert(
        "resultFile".to_string(),
        CwlInput::String(format!("/output/{}_temp.json", process.method_folder)),
    );
    inputs
}

pub struct CwlBackend {
    session: SshSession,
    runner: String,
}

impl CwlBackend {
    pub fn new(config: &CwlConfig, max_output: usize) -> Self {
        Self {
            session: SshSession::new(config.ssh.clone(), max_output),
            runner: config.runner.clone(),
        }
    }

    async fn write_job_file(&self, process: &Process) -> Result<(), ExecutionError> {
        let yaml = serde_yaml::to_string(&job_inputs(process))
            .map_err(|e| ExecutionError::SerializeJob(e.to_string()))?;
        tokio::fs::write(&process.yaml_file, yaml)
            .await
            .map_err(|e| ExecutionError::WriteJobFile {
                path: process.yaml_file.clone(),
                source: e,
            })
    }
}

async fn open_log(path: &Path) -> Result<BufWriter<File>, ExecutionError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file = File::create(path).await.map_err(|e| ExecutionError::WriteJobFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Next line without its terminator, decoded lossily; tools are free to
/// print bytes that are not UTF-8.
async fn next_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

async fn write_line(log: &mut BufWriter<File>, line: &str) -> std::io::Result<()> {
    log.write_all(line.as_bytes()).await?;
    log.write_all(b"\n").await
}

#[async_trait]
impl Backend for CwlBackend {
    async fn execute(&self, process: &Process) -> Result<Completion, ExecutionError> {
        self.write_job_file(process).await?;

        let remote = shell_join([
            self.runner.clone(),
            "--outdir".to_string(),
            process.output_folder.to_string_lossy().into_owned(),
            process.cwl_file.to_string_lossy().into_owned(),
            process.yaml_file.to_string_lossy().into_owned(),
        ]);

        let mut std_log = open_log(&process.log_files.std).await?;
        let mut err_log = open_log(&process.log_files.err).await?;
        let mut cwl_log = open_log(&process.log_files.cwl).await?;

        let mut cmd = self.session.command(&remote);
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        log::info!("Running CWL job {} on {}", process.yaml_file.display(), self.session.target());
        let mut child = cmd.spawn().map_err(|e| ExecutionError::Spawn {
            program: "ssh".to_string(),
            source: e,
        })?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let stdout_task = async {
            if let Some(stdout) = stdout_pipe {
                let mut reader = BufReader::new(stdout);
                let mut buf = Vec::new();
                while let Some(line) = next_line(&mut reader, &mut buf).await? {
                    write_line(&mut std_log, &line).await?;
                }
            }
            std_log.flush().await
        };

        let stderr_task = async {
            if let Some(stderr) = stderr_pipe {
                let mut reader = BufReader::new(stderr);
                let mut buf = Vec::new();
                while let Some(line) = next_line(&mut reader, &mut buf).await? {
                    if line.starts_with("[job") {
                        write_line(&mut cwl_log, &line).await?;
                    } else {
                        write_line(&mut err_log, &line).await?;
                    }
                }
            }
            cwl_log.flush().await?;
            err_log.flush().await
        };

        tokio::try_join!(stdout_task, stderr_task)?;

        let status = child.wait().await?;
        if !status.success() {
            return Err(ExecutionError::CwlFailed {
                code: exit_code(status),
            });
        }
        Ok(Completion::Workflow)
    }
}
