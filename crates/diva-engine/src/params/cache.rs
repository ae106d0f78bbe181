//! Per-algorithm result cache keyed by input fingerprint.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CacheError;
use crate::process::Process;
use crate::storage::{filesystem, StorageLayout};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    pub highlighters: Value,
    /// Hash of the request parameters.
    pub parameters: String,
    /// Fingerprint over parameters, highlighters and data.
    pub hash: String,
    pub result_file: PathBuf,
    pub data_hash: String,
}

impl CacheRecord {
    pub fn for_process(process: &Process, result_file: PathBuf) -> Self {
        Self {
            highlighters: process.input_highlighters.clone(),
            parameters: process.parameters_hash.clone(),
            hash: process.fingerprint.clone(),
            result_file,
            data_hash: process.data_hash.clone(),
        }
    }
}

/// One JSON array of [`CacheRecord`]s per algorithm under the cache folder.
pub struct ParamCache {
    folder: PathBuf,
    writers: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ParamCache {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            writers: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache_file(&self, method: &str) -> PathBuf {
        self.folder.join(format!("{}.json", method))
    }

    fn writer_lock(&self, method: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut writers = match self.writers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Cache writer map lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        writers
            .entry(method.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Looks up a live result for `process` and rebinds it on a hit.
    pub async fn load_param_info(
        &self,
        process: &mut Process,
        layout: &StorageLayout,
    ) -> Result<bool, CacheError> {
        if process.no_cache {
            return Ok(false);
        }
        let records = read_records(&self.cache_file(&process.cache_method)).await?;
        let hit = records
            .into_iter()
            .find(|r| r.hash == process.fingerprint && r.result_file.exists());

        match hit {
            Some(record) => {
                log::info!(
                    "Cache hit for {} ({}), reusing {}",
                    process.method,
                    process.fingerprint,
                    record.result_file.display()
                );
                process.bind_cached(record.result_file, layout);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stores the record for `process` unless a live one already exists.
    pub async fn save_param_info(&self, process: &Process) -> Result<bool, CacheError> {
        if process.no_cache {
            return Ok(false);
        }
        let Some(result_file) = process.result_file.clone() else {
            return Ok(false);
        };

        let lock = self.writer_lock(&process.cache_method);
        let _guard = lock.lock().await;

        let path = self.cache_file(&process.cache_method);
        let mut records = read_records(&path).await?;

        if records
            .iter()
            .any(|r| r.hash == process.fingerprint && r.result_file.exists())
        {
            return Ok(false);
        }
        records.retain(|r| r.hash != process.fingerprint);
        records.push(CacheRecord::for_process(process, result_file));

        write_records(&path, &records)?;
        Ok(true)
    }

    pub async fn remove_param_info(&self, process: &Process) -> Result<bool, CacheError> {
        let lock = self.writer_lock(&process.cache_method);
        let _guard = lock.lock().await;

        let path = self.cache_file(&process.cache_method);
        let mut records = read_records(&path).await?;
        let before = records.len();
        records.retain(|r| r.hash != process.fingerprint);
        if records.len() == before {
            return Ok(false);
        }

        write_records(&path, &records)?;
        Ok(true)
    }

    pub async fn records(&self, method: &str) -> Result<Vec<CacheRecord>, CacheError> {
        read_records(&self.cache_file(method)).await
    }
}

async fn read_records(path: &Path) -> Result<Vec<CacheRecord>, CacheError> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(CacheError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    serde_json::from_slice(&content).map_err(|e| CacheError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_records(path: &Path, records: &[CacheRecord]) -> Result<(), CacheError> {
    filesystem::write_json(path, &records)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::DataElement;
    use crate::test_support::{descriptor, layout_in, sample_collection};
    use chrono::Utc;
    use tempfile::TempDir;

    fn process(layout: &StorageLayout, collection: &str, element: &str) -> Process {
        let collection = sample_collection(layout, collection);
        Process::new(
            &collection,
            &descriptor("file", "local"),
            0,
            DataElement::from([("inputImage".to_string(), element.to_string())]),
            layout,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_missing_cache_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(dir.path());
        let cache = ParamCache::new(dir.path().join("cache"));
        let mut p = process(&layout, "c1", "scans/a.png");

        assert!(!cache.load_param_info(&mut p, &layout).await.unwrap());
        assert!(p.result_file.is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_rebinds() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(dir.path());
        let cache = ParamCache::new(dir.path().join("cache"));

        let mut first = process(&layout, "c1", "scans/a.png");
        first.reserve_output(&layout).unwrap();
        assert!(cache.save_param_info(&first).await.unwrap());
        assert!(!cache.save_param_info(&first).await.unwrap());

        let mut second = process(&layout, "c2", "scans/a.png");
        assert!(cache.load_param_info(&mut second, &layout).await.unwrap());
        assert_eq!(second.result_file, first.result_file);
        assert_eq!(second.result_link, first.result_link);
        assert_eq!(second.output_folder, first.output_folder);

        let records = cache.records(&first.cache_method).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data_hash, first.data_hash);
    }

    #[tokio::test]
    async fn test_different_data_misses() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(dir.path());
        let cache = ParamCache::new(dir.path().join("cache"));

        let mut first = process(&layout, "c1", "scans/a.png");
        first.reserve_output(&layout).unwrap();
        cache.save_param_info(&first).await.unwrap();

        let mut other = process(&layout, "c2", "scans/b.png");
        assert!(!cache.load_param_info(&mut other, &layout).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_record_is_replaced() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(dir.path());
        let cache = ParamCache::new(dir.path().join("cache"));

        let mut first = process(&layout, "c1", "scans/a.png");
        first.reserve_output(&layout).unwrap();
        cache.save_param_info(&first).await.unwrap();
        std::fs::remove_dir_all(&first.output_folder).unwrap();

        let mut second = process(&layout, "c2", "scans/a.png");
        assert!(!cache.load_param_info(&mut second, &layout).await.unwrap());
        second.reserve_output(&layout).unwrap();
        assert!(cache.save_param_info(&second).await.unwrap());

        let records = cache.records(&second.cache_method).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(Some(records[0].result_file.clone()), second.result_file);
    }

    #[tokio::test]
    async fn test_remove_param_info() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(dir.path());
        let cache = ParamCache::new(dir.path().join("cache"));

        let mut p = process(&layout, "c1", "scans/a.png");
        p.reserve_output(&layout).unwrap();
        cache.save_param_info(&p).await.unwrap();

        assert!(cache.remove_param_info(&p).await.unwrap());
        assert!(!cache.remove_param_info(&p).await.unwrap());
        assert!(cache.records(&p.cache_method).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_cache_flag_skips() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(dir.path());
        let cache = ParamCache::new(dir.path().join("cache"));

        let mut p = process(&layout, "c1", "scans/a.png");
        p.no_cache = true;
        p.reserve_output(&layout).unwrap();
        assert!(!cache.save_param_info(&p).await.unwrap());
        assert!(!cache.cache_file(&p.cache_method).exists());
    }

    #[tokio::test]
    async fn test_corrupt_cache_file_propagates() {
        let dir = TempDir::new().unwrap();
        let layout = layout_in(dir.path());
        let cache = ParamCache::new(dir.path().join("cache"));
        let mut p = process(&layout, "c1", "scans/a.png");
        std::fs::create_dir_all(dir.path().join("cache")).unwrap();
        std::fs::write(cache.cache_file(&p.cache_method), b"{broken").unwrap();

        assert!(matches!(
            cache.load_param_info(&mut p, &layout).await,
            Err(CacheError::Parse { .. })
        ));
    }
}
