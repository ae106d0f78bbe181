//! Grid-engine submission over SSH.

use async_trait::async_trait;

use crate::backend::command::shell_join;
use crate::backend::ssh::SshSession;
use crate::backend::{callback_urls, Backend, Completion};
use crate::config::RemoteConfig;
use crate::error::ExecutionError;
use crate::params::ParamValue;
use crate::process::Process;

pub struct RemoteBackend {
    session: SshSession,
    remote_root: String,
    submit_command: String,
}

impl RemoteBackend {
    pub fn new(config: &RemoteConfig, max_output: usize) -> Self {
        Self {
            session: SshSession::new(config.ssh.clone(), max_output),
            remote_root: config.remote_root.trim_end_matches('/').to_string(),
            submit_command: config.submit_command.clone(),
        }
    }

    fn collection_folder(&self, process: &Process) -> String {
        format!("{}/{}", self.remote_root, process.root_folder)
    }

    fn job_folder(&self, process: &Process) -> String {
        format!("{}/{}", self.collection_folder(process), process.method_folder)
    }

    /// Uploads referenced data and returns the arguments as seen on the cluster.
    async fn remote_args(&self, process: &Process, job_folder: &str) -> Result<Vec<String>, ExecutionError> {
        let mut args = Vec::new();
        for (name, value) in &process.matched_parameters {
            if let Some(path) = process.remote_paths.get(name) {
                args.push(path.clone());
                continue;
            }
            match value {
                ParamValue::Data(item) => {
                    let remote = format!("{}/{}", job_folder, item.filename);
                    self.session.upload(&item.path, &remote).await?;
                    args.push(remote);
                }
                ParamValue::Literal(_) if name == "outputFolder" => args.push(job_folder.to_string()),
                other => args.extend(other.local_args()),
            }
        }
        Ok(args)
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    async fn execute(&self, process: &Process) -> Result<Completion, ExecutionError> {
        let (result_url, error_url) = callback_urls(process)?;
        let job_folder = self.job_folder(process);

        self.session.mkdir_p(&job_folder).await?;
        let args = self.remote_args(process, &job_folder).await?;

        let executable = process.executable_path.to_string_lossy();
        let command = shell_join(
            [
                self.submit_command.as_str(),
                &*executable,
                result_url,
                error_url,
            ]
            .into_iter()
            .map(str::to_string)
            .chain(args),
        );

        let output = self.session.exec(&command).await?;
        log::info!(
            "Submitted {}/{} to {}: {}",
            process.root_folder,
            process.method_folder,
            self.session.target(),
            output.stdout.trim()
        );
        Ok(Completion::Detached)
    }

    /// Removes this job's uploads only; siblings in the same collection may
    /// still be running.
    async fn clean_up(&self, process: &Process) -> Result<(), ExecutionError> {
        self.session.remove_dir(&self.job_folder(process)).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::params::DataItem;
    use crate::test_support::{fake_binary, layout_in, planned_process, ssh_config};
    use tempfile::TempDir;

    fn backend(dir: &std::path::Path, log: &std::path::Path) -> RemoteBackend {
        let script = format!("echo \"$@\" >> {}", log.display());
        let ssh = fake_binary(dir, "ssh", &script);
        let scp = fake_binary(dir, "scp", &script);
        let config = RemoteConfig {
            ssh: ssh_config(&ssh, &scp),
            remote_root: "/scratch/diva/".to_string(),
            submit_command: "qsub".to_string(),
        };
        RemoteBackend::new(&config, 4096)
    }

    #[tokio::test]
    async fn test_submits_with_remote_paths() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("calls.log");
        let backend = backend(dir.path(), &log);

        let layout = layout_in(dir.path());
        let mut process = planned_process(&layout, "file");
        process.executable_path = "/cluster/bin/otsu".into();
        process.remote_result_url = Some("http://diva.test/jobs/17/tok".into());
        process.remote_error_url = Some("http://diva.test/jobs/17/tok/error".into());
        process.remote_paths.insert("model".into(), "/cluster/models/en".into());
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
            ("outputFolder".into(), ParamValue::Literal("/local/out".into())),
            ("model".into(), ParamValue::Literal("/local/models/en".into())),
            ("size".into(), ParamValue::Literal("3".into())),
        ];

        let completion = backend.execute(&process).await.unwrap();
        assert_eq!(completion, Completion::Detached);

        let job = format!("/scratch/diva/{}/data_0", process.root_folder);
        let calls = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with(&format!("mkdir -p '{}'", job)));
        assert!(lines[1].ends_with(&format!(
            "/data/files/scans/original/a.png diva@cluster:{}/a.png",
            job
        )));
        assert!(lines[2].ends_with(&format!(
            "'qsub' '/cluster/bin/otsu' 'http://diva.test/jobs/17/tok' 'http://diva.test/jobs/17/tok/error' '{job}/a.png' '{job}' '/cluster/models/en' '3'",
            job = job
        )));
    }

    #[tokio::test]
    async fn test_requires_callback_urls() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("calls.log");
        let backend = backend(dir.path(), &log);
        let layout = layout_in(dir.path());
        let process = planned_process(&layout, "file");

        assert!(matches!(
            backend.execute(&process).await,
            Err(ExecutionError::NotStarted)
        ));
        assert!(!log.exists());
    }

    #[tokio::test]
    async fn test_clean_up_leaves_sibling_jobs() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("calls.log");
        let backend = backend(dir.path(), &log);
        let layout = layout_in(dir.path());
        let first = planned_process(&layout, "file");
        let mut second = first.clone();
        second.method_folder = "data_1".into();

        backend.clean_up(&first).await.unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().count(), 1);
        assert!(calls
            .trim()
            .ends_with(&format!("rm -rf '/scratch/diva/{}/data_0'", first.root_folder)));
        assert!(!calls.contains(&second.method_folder));
    }
}
