use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub version: String,
    pub server: ServerConfig,
    pub paths: PathsConfig,
    #[serde(default = "default_reserved_words")]
    pub reserved_words: Vec<String>,
    /// Values for platform-specific reserved parameters (e.g. `matlabPath`).
    #[serde(default)]
    pub constants: BTreeMap<String, String>,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub cwl: Option<CwlConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved_words.iter().any(|w| w == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Public base URL, including scheme, under which results and files are served.
    pub root_url: String,
    /// Run docker jobs through a CWL runner on a remote host instead of the local daemon.
    #[serde(default)]
    pub cwl_support: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of all collection result folders and result files.
    pub results_path: PathBuf,
    /// Root of stored data collections (`<files_path>/<collection>/original/<file>`).
    pub files_path: PathBuf,
    /// Folder holding one parameter cache file per algorithm.
    pub cache_path: PathBuf,
    /// Root of per-algorithm job log folders.
    pub log_path: PathBuf,
    /// Root of installed algorithm executables and CWL tool files.
    pub executable_path: PathBuf,
    /// The services file with algorithm descriptors and execution statistics.
    pub services_info_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,
}

fn default_max_concurrent() -> usize {
    num_cpus::get()
}

fn default_max_buffer_bytes() -> usize {
    1024 * 1024 * 10
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_buffer_bytes: default_max_buffer_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    #[serde(default = "default_docker_binary")]
    pub binary: String,
    /// Daemon address passed as `-H`; the local socket is used when unset.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_entry_script")]
    pub entry_script: String,
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_entry_script() -> String {
    "./script.sh".to_string()
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: default_docker_binary(),
            host: None,
            entry_script: default_entry_script(),
            shell: default_shell(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    pub host: String,
    pub user: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
    #[serde(default = "default_ssh_binary")]
    pub ssh_binary: String,
    #[serde(default = "default_scp_binary")]
    pub scp_binary: String,
}

fn default_ssh_binary() -> String {
    "ssh".to_string()
}

fn default_scp_binary() -> String {
    "scp".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(flatten)]
    pub ssh: SshConfig,
    /// Folder on the cluster under which per-collection job folders are created.
    pub remote_root: String,
    #[serde(default = "default_submit_command")]
    pub submit_command: String,
}

fn default_submit_command() -> String {
    "qsub".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CwlConfig {
    #[serde(flatten)]
    pub ssh: SshConfig,
    #[serde(default = "default_cwl_runner")]
    pub runner: String,
}

fn default_cwl_runner() -> String {
    "cwltool".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

pub const REQUIRED_RESERVED_WORDS: &[&str] = &["highlighter", "host", "outputFolder", "resultFile"];

fn default_reserved_words() -> Vec<String> {
    REQUIRED_RESERVED_WORDS
        .iter()
        .chain(
            [
                "matlabPath",
                "matlabScriptsPath",
                "ocropyLanguageModelsPath",
                "mcr2014b",
            ]
            .iter(),
        )
        .map(|w| w.to_string())
        .collect()
}
