//! Read-modify-write access to the services file.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::error::ServicesError;
use crate::services::descriptor::{
    AlgorithmDescriptor, ExceptionRecord, ExecutionStatistics, ServiceState, ServicesFile,
};
use crate::storage::filesystem;

/// The services file is rewritten wholesale on every update; all writers go
/// through one async lock.
pub struct ServicesRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ServicesRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<ServicesFile, ServicesError> {
        let content = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ServicesError::Read {
                path: self.path.clone(),
                source: e,
            })?;
        serde_json::from_slice(&content).map_err(|e| ServicesError::Parse {
            path: self.path.clone(),
            source: e,
        })
    }

    pub async fn info_by_path(&self, path: &str) -> Result<AlgorithmDescriptor, ServicesError> {
        self.load()
            .await?
            .by_path(path)
            .cloned()
            .ok_or_else(|| ServicesError::UnknownPath(path.to_string()))
    }

    /// Applies `f` to the current file content and writes the result back.
    pub async fn update<F, R>(&self, f: F) -> Result<R, ServicesError>
    where
        F: FnOnce(&mut ServicesFile) -> R,
    {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;
        let result = f(&mut file);
        filesystem::write_json(&self.path, &file)?;
        Ok(result)
    }

    /// Appends `{date, errorMessage}` to the algorithm's exception list.
    pub async fn record_exception(
        &self,
        identifier: &str,
        message: &str,
    ) -> Result<bool, ServicesError> {
        let record = ExceptionRecord {
            date: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            error_message: message.to_string(),
        };
        self.update(|file| match file.by_identifier_mut(identifier) {
            Some(service) => {
                service.exceptions.push(record);
                true
            }
            None => false,
        })
        .await
    }

    pub async fn update_status(
        &self,
        path: &str,
        state: ServiceState,
    ) -> Result<bool, ServicesError> {
        let status = state.to_status();
        self.update(|file| match file.by_path_mut(path) {
            Some(service) => {
                service.status = status;
                true
            }
            None => false,
        })
        .await
    }

    /// Records one finished run of the algorithm at `path`.
    pub async fn record_execution(
        &self,
        path: &str,
        elapsed: f64,
    ) -> Result<Option<ExecutionStatistics>, ServicesError> {
        self.update(|file| {
            file.by_path_mut(path).map(|service| {
                service.statistics.record(elapsed);
                service.statistics.clone()
            })
        })
        .await
    }

    pub async fn statistics(&self, path: &str) -> Result<Option<ExecutionStatistics>, ServicesError> {
        Ok(self.load().await?.by_path(path).map(|s| s.statistics.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> ServicesRegistry {
        let path = dir.path().join("services.json");
        std::fs::write(
            &path,
            serde_json::to_vec(&serde_json::json!({
                "services": [{
                    "service": "echo",
                    "identifier": "1",
                    "path": "/echo/1",
                    "executablePath": "/bin/echo",
                    "output": "console",
                    "execute": "local",
                    "executableType": "binary"
                }]
            }))
            .unwrap(),
        )
        .unwrap();
        ServicesRegistry::new(path)
    }

    #[tokio::test]
    async fn test_info_by_path() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        let info = registry.info_by_path("/echo/1").await.unwrap();
        assert_eq!(info.identifier, "1");

        let missing = registry.info_by_path("/nope").await;
        assert!(matches!(missing, Err(ServicesError::UnknownPath(_))));
    }

    #[tokio::test]
    async fn test_record_exception_persists() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        assert!(registry.record_exception("1", "container exited with 1").await.unwrap());
        assert!(!registry.record_exception("unknown", "x").await.unwrap());

        let info = registry.info_by_path("/echo/1").await.unwrap();
        assert_eq!(info.exceptions.len(), 1);
        assert_eq!(info.exceptions[0].error_message, "container exited with 1");
    }

    #[tokio::test]
    async fn test_record_execution_updates_average() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        registry.record_execution("/echo/1", 2.0).await.unwrap();
        let stats = registry.record_execution("/echo/1", 4.0).await.unwrap().unwrap();
        assert_eq!(stats.executions, 2);
        assert!((stats.runtime - 3.0).abs() < 1e-9);

        let stored = registry.statistics("/echo/1").await.unwrap().unwrap();
        assert_eq!(stored, stats);
    }

    #[tokio::test]
    async fn test_update_status() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        registry
            .update_status("/echo/1", ServiceState::Error("schema".into()))
            .await
            .unwrap();
        let info = registry.info_by_path("/echo/1").await.unwrap();
        assert_eq!(info.status.status_code, 500);
    }

    #[tokio::test]
    async fn test_missing_file_is_read_error() {
        let registry = ServicesRegistry::new("/nonexistent/services.json");
        assert!(matches!(registry.load().await, Err(ServicesError::Read { .. })));
    }
}
