//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thread count, queue capacity, port)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - The same field checks back the runtime setters on `Server`

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single rejected configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("max_threads cannot be less than 1")]
    MaxThreads,

    #[error("max_pending_requests cannot be less than 1")]
    MaxPendingRequests,

    #[error("port {0:?} is not a number between 0 and 65535")]
    Port(String),

    #[error("host may not be empty")]
    EmptyHost,

    #[error("protocol may not be empty")]
    EmptyProtocol,

    #[error("dir_index may not be empty")]
    EmptyDirIndex,

    #[error("web_root may not be empty")]
    EmptyWebRoot,

    #[error("dir_index {0:?} must be a plain file name")]
    DirIndexPath(String),

    #[error("max_body_bytes cannot be 0")]
    MaxBodyBytes,

    #[error("shutdown_timeout_secs {0} exceeds the maximum of 86400 (one day)")]
    ShutdownTimeout(u64),
}

/// Upper bound for `shutdown_timeout_secs` (one day).
pub const MAX_SHUTDOWN_TIMEOUT_SECS: u64 = 24 * 60 * 60;

pub fn check_max_threads(value: usize) -> Result<(), ValidationError> {
    if value < 1 {
        return Err(ValidationError::MaxThreads);
    }
    Ok(())
}

pub fn check_max_pending_requests(value: usize) -> Result<(), ValidationError> {
    if value < 1 {
        return Err(ValidationError::MaxPendingRequests);
    }
    Ok(())
}

pub fn check_port(value: &str) -> Result<(), ValidationError> {
    value
        .parse::<u16>()
        .map(|_| ())
        .map_err(|_| ValidationError::Port(value.to_string()))
}

pub fn check_host(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyHost);
    }
    Ok(())
}

pub fn check_protocol(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyProtocol);
    }
    Ok(())
}

pub fn check_dir_index(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyDirIndex);
    }
    if value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(ValidationError::DirIndexPath(value.to_string()));
    }
    Ok(())
}

pub fn check_shutdown_timeout_secs(value: u64) -> Result<(), ValidationError> {
    if value > MAX_SHUTDOWN_TIMEOUT_SECS {
        return Err(ValidationError::ShutdownTimeout(value));
    }
    Ok(())
}

/// Validate every field of a configuration, collecting all failures.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let checks = [
        check_protocol(&config.protocol),
        check_host(&config.host),
        check_port(&config.port),
        check_dir_index(&config.dir_index),
        check_max_threads(config.max_threads),
        check_max_pending_requests(config.max_pending_requests),
        check_shutdown_timeout_secs(config.shutdown_timeout_secs),
    ];
    errors.extend(checks.into_iter().filter_map(Result::err));

    if let Some(root) = &config.web_root {
        if root.as_os_str().is_empty() {
            errors.push(ValidationError::EmptyWebRoot);
        }
    }
    if config.max_body_bytes == 0 {
        errors.push(ValidationError::MaxBodyBytes);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = ServerConfig::default();
        config.max_threads = 0;
        config.max_pending_requests = 0;
        config.port = "http".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::MaxThreads));
        assert!(errors.contains(&ValidationError::MaxPendingRequests));
        assert!(errors.contains(&ValidationError::Port("http".into())));
    }

    #[test]
    fn dir_index_is_a_file_name() {
        assert!(check_dir_index("index.html").is_ok());
        assert!(check_dir_index("default.htm").is_ok());
        for bad in ["../../etc/hostname", "..", "sub/index.html", "sub\\index.html", "/index.html"] {
            assert_eq!(check_dir_index(bad), Err(ValidationError::DirIndexPath(bad.into())), "{bad}");
        }
    }

    #[test]
    fn shutdown_timeout_is_bounded() {
        let mut config = ServerConfig::default();
        config.shutdown_timeout_secs = MAX_SHUTDOWN_TIMEOUT_SECS;
        assert!(validate_config(&config).is_ok());

        config.shutdown_timeout_secs = u64::MAX;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::ShutdownTimeout(u64::MAX)]
        );
    }

    #[test]
    fn port_range() {
        assert!(check_port("0").is_ok());
        assert!(check_port("65535").is_ok());
        assert!(check_port("65536").is_err());
        assert!(check_port("-1").is_err());
    }
}
