pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod params;
pub mod process;
pub mod queue;
pub mod result;
pub mod services;
pub mod statistics;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use backend::{Backend, BackendKind, Backends, Completion, ExecutorKind, ProcessOutput};
pub use config::{load_config, load_config_from_str, EngineConfig};
pub use engine::Engine;
pub use error::{
    CacheError, ConfigError, EngineError, ExecutionError, ParameterError, Result, ResultError,
    ServicesError, StorageError,
};
pub use logging::init_logging;
pub use process::{CollectionResponse, ExecutionRequest, ExecutionType, Process};
pub use result::{validate_result, ResultHandler, ResultKind};
pub use services::{AlgorithmDescriptor, ServicesRegistry};
pub use statistics::{Settled, Statistics};
pub use storage::StorageLayout;
