use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Result error: {0}")]
    Result(#[from] ResultError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Services error: {0}")]
    Services(#[from] ServicesError),
}

impl EngineError {
    /// HTTP-style status code an outer layer should report for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::Parameter(_) => 400,
            EngineError::Services(ServicesError::UnknownPath(_)) => 404,
            _ => 500,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum ParameterError {
    #[error("Invalid highlighter: {0}")]
    InvalidHighlighter(String),

    #[error("Reserved parameter '{0}' cannot be resolved")]
    UnknownReserved(String),

    #[error("Provided unnecessary data for parameter '{0}'")]
    UnnecessaryData(String),

    #[error("Did not receive data for all parameters, missing: {}", .0.join(", "))]
    MissingData(Vec<String>),

    #[error("Invalid data reference '{0}', expected 'collection/filename'")]
    InvalidDataReference(String),

    #[error("Referenced file '{0}' does not exist")]
    FileNotFound(PathBuf),

    #[error("Parameter '{0}' could not be matched to any provided parameter or data")]
    UnmatchedParameter(String),

    #[error("Request contains no data")]
    NoData,

    #[error("Failed to expand data wildcard '{pattern}': {reason}")]
    Wildcard { pattern: String, reason: String },

    #[error("Failed to write parameter file '{path}': {source}")]
    WriteParameterFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("Command output exceeded {limit} bytes")]
    OutputLimitExceeded { limit: usize },

    #[error("Container '{container}' exited with code {code}")]
    ContainerFailed { container: String, code: i32 },

    #[error("CWL run exited with code {code}")]
    CwlFailed { code: i32 },

    #[error("SSH command failed on '{target}': {message}")]
    Ssh { target: String, message: String },

    #[error("Backend '{0}' is not configured")]
    BackendNotConfigured(&'static str),

    #[error("Process has no image name for docker execution")]
    MissingImage,

    #[error("Process was not started; it has no correlation token or callback URLs")]
    NotStarted,

    #[error("Failed to write job file '{path}': {source}")]
    WriteJobFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize CWL job: {0}")]
    SerializeJob(String),

    #[error("I/O error during execution: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ResultError {
    #[error("Algorithm wrote to stderr: {0}")]
    Stderr(String),

    #[error("Failed to read result file '{path}': {source}")]
    ReadResult {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse result document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to decode output asset '{name}': {reason}")]
    DecodeAsset { name: String, reason: String },

    #[error("Result does not match response schema: {0}")]
    Schema(String),

    #[error("Process has no result file")]
    MissingResultFile,

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to read cache file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write cache file: {0}")]
    Write(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize JSON for '{path}': {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum ServicesError {
    #[error("Failed to read services file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse services file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write services file: {0}")]
    Write(#[from] StorageError),

    #[error("No algorithm registered for path '{0}'")]
    UnknownPath(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
