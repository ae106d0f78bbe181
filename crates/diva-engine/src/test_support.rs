//! Fixtures shared by unit tests.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::json;

use crate::config::{load_config_from_str, EngineConfig, SshConfig};
use crate::params::DataItem;
use crate::process::{Collection, DataElement, ExecutionRequest, ExecutionType, Process};
use crate::services::{AlgorithmDescriptor, ServicesFile};
use crate::storage::StorageLayout;

pub const SERVICE_PATH: &str = "/binarization/otsu/1";

pub fn test_config(root: &Path) -> EngineConfig {
    let config = json!({
        "version": "1.0",
        "server": { "root_url": "http://diva.test" },
        "paths": {
            "results_path": root.join("results"),
            "files_path": root.join("files"),
            "cache_path": root.join("cache"),
            "log_path": root.join("logs"),
            "executable_path": root.join("executables"),
            "services_info_file": root.join("services.json")
        }
    });
    load_config_from_str(&config.to_string()).unwrap()
}

pub fn layout_in(root: &Path) -> StorageLayout {
    StorageLayout::new(&test_config(root))
}

/// Otsu binarization on one input image, with the given output and backend.
pub fn descriptor(output: &str, execute: &str) -> AlgorithmDescriptor {
    serde_json::from_value(json!({
        "service": "otsubinarization",
        "identifier": "17",
        "path": SERVICE_PATH,
        "executablePath": "/data/executables/binarization/otsu/1/otsu",
        "output": output,
        "execute": execute,
        "executableType": "binary",
        "image_name": "diva/otsu:1",
        "parameters": [],
        "data": [{"inputImage": "file"}],
        "paramOrder": [{"inputImage": "file"}]
    }))
    .unwrap()
}

pub fn sample_collection(layout: &StorageLayout, name: &str) -> Collection {
    let mut collection = Collection::new(
        "otsubinarization",
        SERVICE_PATH,
        &ExecutionRequest::default(),
        ExecutionType::Regular,
        layout,
    );
    collection.name = name.to_string();
    collection.output_folder = layout.collection_output_folder(name);
    collection.result_file = layout.collection_result_file(name);
    collection.result_link = layout.static_result_url(&collection.result_file);
    collection
}

/// Places a small file in the data store as `<collection>/<filename>`.
pub fn store_file(layout: &StorageLayout, collection: &str, filename: &str) -> PathBuf {
    let path = layout.data_file(collection, filename);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"\x89PNG").unwrap();
    path
}

/// A process with its output folder reserved, ready to be queued.
pub fn planned_process(layout: &StorageLayout, output: &str) -> Process {
    let collection = sample_collection(layout, &uuid::Uuid::new_v4().simple().to_string());
    let mut process = Process::new(
        &collection,
        &descriptor(output, "local"),
        0,
        DataElement::new(),
        layout,
        Utc::now(),
    );
    process.reserve_output(layout).unwrap();
    process
}

pub fn planned_process_with_image(layout: &StorageLayout) -> Process {
    let path = store_file(layout, "scans", "page1.png");
    let mut process = planned_process(layout, "file");
    process.data.insert(
        "inputImage".to_string(),
        DataItem {
            collection: Some("scans".to_string()),
            filename: "page1.png".to_string(),
            path,
            url: layout.data_url("scans", "page1.png"),
        },
    );
    process
}

/// Executable shell script standing in for an external program.
#[cfg(unix)]
pub fn fake_binary(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn ssh_config(ssh: &Path, scp: &Path) -> SshConfig {
    SshConfig {
        host: "cluster".to_string(),
        user: "diva".to_string(),
        port: None,
        identity_file: None,
        ssh_binary: ssh.to_string_lossy().into_owned(),
        scp_binary: scp.to_string_lossy().into_owned(),
    }
}

/// Writes a services file holding [`descriptor`] where [`test_config`] expects it.
pub fn write_services_file(root: &Path) -> PathBuf {
    let path = root.join("services.json");
    let file = ServicesFile {
        services: vec![descriptor("file", "local")],
        ..Default::default()
    };
    std::fs::write(&path, serde_json::to_vec_pretty(&file).unwrap()).unwrap();
    path
}
