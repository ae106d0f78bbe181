//! Path and URL conventions for results, stored data, logs and caches.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;

/// Per-job log files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFiles {
    pub std: PathBuf,
    pub err: PathBuf,
    pub cwl: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root_url: String,
    results_path: PathBuf,
    files_path: PathBuf,
    log_path: PathBuf,
    executable_path: PathBuf,
}

impl StorageLayout {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            root_url: config.server.root_url.clone(),
            results_path: config.paths.results_path.clone(),
            files_path: config.paths.files_path.clone(),
            log_path: config.paths.log_path.clone(),
            executable_path: config.paths.executable_path.clone(),
        }
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    pub fn collection_output_folder(&self, collection: &str) -> PathBuf {
        self.results_path.join(collection)
    }

    pub fn collection_result_file(&self, collection: &str) -> PathBuf {
        self.results_path.join(format!("{}.json", collection))
    }

    pub fn process_output_folder(&self, collection: &str, index: usize) -> PathBuf {
        self.collection_output_folder(collection)
            .join(format!("data_{}", index))
    }

    pub fn result_file(folder: &Path, method_folder: &str) -> PathBuf {
        folder.join(format!("{}.json", method_folder))
    }

    pub fn temp_result_file(folder: &Path, method_folder: &str) -> PathBuf {
        folder.join(format!("{}_temp.json", method_folder))
    }

    /// `<files_path>/<collection>/original`
    pub fn collection_files_folder(&self, collection: &str) -> PathBuf {
        self.files_path.join(collection).join("original")
    }

    pub fn data_file(&self, collection: &str, filename: &str) -> PathBuf {
        self.collection_files_folder(collection).join(filename)
    }

    pub fn data_url(&self, collection: &str, filename: &str) -> String {
        format!(
            "{}/files/{}/original/{}",
            self.root_url, collection, filename
        )
    }

    /// Public URL of a file below the results or files root. Paths outside both
    /// roots are returned unchanged.
    pub fn public_url(&self, path: &Path) -> String {
        if let Ok(relative) = path.strip_prefix(&self.results_path) {
            return format!("{}/results/{}", self.root_url, url_path(relative));
        }
        if let Ok(relative) = path.strip_prefix(&self.files_path) {
            return format!("{}/files/{}", self.root_url, url_path(relative));
        }
        path.to_string_lossy().into_owned()
    }

    pub fn static_result_url(&self, path: &Path) -> String {
        match path.strip_prefix(&self.results_path) {
            Ok(relative) => format!("{}/results/{}", self.root_url, url_path(relative)),
            Err(_) => format!(
                "{}/results/{}",
                self.root_url,
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            ),
        }
    }

    pub fn collection_link(&self, collection: &str) -> String {
        format!("{}/collections/{}", self.root_url, collection)
    }

    pub fn zip_link(&self, root_folder: &str, method_folder: &str) -> String {
        format!(
            "{}/collection/{}/{}",
            self.root_url, root_folder, method_folder
        )
    }

    /// Result and error callback URLs for an in-flight job.
    pub fn callback_urls(&self, identifier: &str, token: &str) -> (String, String) {
        let result = format!("{}/jobs/{}/{}", self.root_url, identifier, token);
        let error = format!("{}/error", result);
        (result, error)
    }

    pub fn log_folder(&self, service_path: &str) -> PathBuf {
        self.log_path.join(service_path.trim_matches('/'))
    }

    pub fn log_files(folder: &Path, method_folder: &str, now: DateTime<Utc>) -> LogFiles {
        let prefix = format!(
            "{}_{}",
            now.format("%Y_%m_%d_%H_%M_%S_%3f"),
            method_folder
        );
        LogFiles {
            std: folder.join(format!("{}_std.log", prefix)),
            err: folder.join(format!("{}_err.log", prefix)),
            cwl: folder.join(format!("{}_cwl.log", prefix)),
        }
    }

    pub fn cwl_file(&self, service_path: &str, identifier: &str) -> PathBuf {
        self.executable_path
            .join(service_path.trim_matches('/'))
            .join(format!("{}.cwl", identifier))
    }
}

fn url_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
