//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading and mutation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid value: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Could not create web root {path:?}: {source}")]
    WebRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let config: ServerConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Resolve the configured web root, falling back to `webroot` beside the executable,
/// and create the directory when it does not exist yet.
pub fn prepare_web_root(configured: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = match configured {
        Some(path) => path.to_path_buf(),
        None => default_web_root(),
    };
    if path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid(ValidationError::EmptyWebRoot));
    }
    if !path.is_dir() {
        fs::create_dir_all(&path).map_err(|source| ConfigError::WebRoot {
            path: path.clone(),
            source,
        })?;
    }
    Ok(path)
}

fn default_web_root() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("webroot")
}
