//! Test harness for isolated engine runs.
//!
//! Every harness gets its own results, files, cache, logs and services file
//! below a temp directory, so tests never share state.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

use diva_engine::{load_config_from_str, Backends, Engine, EngineConfig};

pub const ROOT_URL: &str = "http://diva.test";

pub struct TestHarness {
    temp_dir: TempDir,
    /// Config overrides merged into the base config (top-level keys).
    overrides: Value,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            temp_dir,
            overrides: json!({}),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn services_file(&self) -> PathBuf {
        self.root().join("services.json")
    }

    /// Merges `patch` into the top level of the engine config.
    pub fn configure(mut self, patch: Value) -> Self {
        if let (Some(target), Some(patch)) = (self.overrides.as_object_mut(), patch.as_object()) {
            for (k, v) in patch {
                target.insert(k.clone(), v.clone());
            }
        }
        self
    }

    pub fn with_local_ceiling(self, max_concurrent: usize) -> Self {
        self.configure(json!({ "local": { "max_concurrent": max_concurrent } }))
    }

    pub fn config(&self) -> EngineConfig {
        let root = self.root();
        let mut config = json!({
            "version": "1.0",
            "server": { "root_url": ROOT_URL },
            "paths": {
                "results_path": root.join("results"),
                "files_path": root.join("files"),
                "cache_path": root.join("cache"),
                "log_path": root.join("logs"),
                "executable_path": root.join("executables"),
                "services_info_file": self.services_file()
            },
            "local": { "max_concurrent": 4 }
        });
        if let (Some(target), Some(patch)) = (config.as_object_mut(), self.overrides.as_object()) {
            for (k, v) in patch {
                target.insert(k.clone(), v.clone());
            }
        }
        load_config_from_str(&config.to_string()).expect("Failed to load test config")
    }

    pub fn engine(&self) -> Arc<Engine> {
        Engine::new(self.config())
    }

    pub fn engine_with_backends(&self, backends: Backends) -> Arc<Engine> {
        Engine::with_backends(self.config(), backends)
    }

    /// Writes the services file with the given descriptors.
    pub fn write_services(&self, services: Vec<Value>) {
        let content = serde_json::to_vec_pretty(&json!({ "services": services }))
            .expect("Failed to serialize services");
        std::fs::write(self.services_file(), content).expect("Failed to write services file");
    }

    pub fn services(&self) -> Value {
        read_json(&self.services_file())
    }

    /// The services file entry at `path`.
    pub fn service(&self, path: &str) -> Value {
        self.services()["services"]
            .as_array()
            .and_then(|services| services.iter().find(|s| s["path"] == path))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Stores a data file as `<collection>/original/<filename>`.
    pub fn store_file(&self, collection: &str, filename: &str) -> PathBuf {
        let folder = self.root().join("files").join(collection).join("original");
        std::fs::create_dir_all(&folder).expect("Failed to create collection folder");
        let path = folder.join(filename);
        std::fs::write(&path, b"\x89PNG").expect("Failed to write data file");
        path
    }

    /// Writes an executable shell script under the executables folder.
    #[cfg(unix)]
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let folder = self.root().join("executables");
        std::fs::create_dir_all(&folder).expect("Failed to create executables folder");
        let path = folder.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod script");
        path
    }

    /// Local path of a public result URL.
    pub fn result_path(&self, url: &str) -> PathBuf {
        let relative = url
            .strip_prefix(&format!("{}/results/", ROOT_URL))
            .expect("Not a result URL");
        self.root().join("results").join(relative)
    }

    pub fn read_result(&self, url: &str) -> Value {
        read_json(&self.result_path(url))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn read_json(path: &Path) -> Value {
    let content = std::fs::read(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    serde_json::from_slice(&content)
        .unwrap_or_else(|e| panic!("Failed to parse {}: {}", path.display(), e))
}

/// Like [`read_json`], but `Null` while the file is missing or being replaced.
pub fn try_read_json(path: &Path) -> Value {
    std::fs::read(path)
        .ok()
        .and_then(|content| serde_json::from_slice(&content).ok())
        .unwrap_or(Value::Null)
}

/// Polls `condition` until it holds, failing the test after ten seconds.
pub async fn wait_until<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("Timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
