use std::path::{Path, PathBuf};

use crate::config::schema::{EngineConfig, REQUIRED_RESERVED_WORDS};
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// Platform default location of the engine configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("diva-engine").join("config.json"))
}

fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let root_url = &config.server.root_url;
    if !(root_url.starts_with("http://") || root_url.starts_with("https://")) {
        return Err(ConfigError::Validation {
            message: format!("server.root_url must include a scheme: {}", root_url),
        });
    }
    if root_url.ends_with('/') {
        return Err(ConfigError::Validation {
            message: format!("server.root_url must not end with '/': {}", root_url),
        });
    }

    if config.local.max_concurrent == 0 {
        return Err(ConfigError::Validation {
            message: "local.max_concurrent must be > 0".to_string(),
        });
    }

    for required in REQUIRED_RESERVED_WORDS {
        if !config.is_reserved(required) {
            return Err(ConfigError::Validation {
                message: format!("reserved_words must contain '{}'", required),
            });
        }
    }

    for name in config.constants.keys() {
        if !config.is_reserved(name) {
            return Err(ConfigError::Validation {
                message: format!("Constant '{}' is not a reserved word", name),
            });
        }
    }

    if config.server.cwl_support && config.cwl.is_none() {
        return Err(ConfigError::Validation {
            message: "server.cwl_support requires a 'cwl' section".to_string(),
        });
    }

    Ok(())
}
