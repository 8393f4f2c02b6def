//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the dispatch server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// URI scheme used for the base URL (e.g., "http").
    pub protocol: String,

    /// Host name to listen on. "+" or "*" listens on all interfaces.
    pub host: String,

    /// Port number, kept as a string to match the base URL form.
    pub port: String,

    /// Directory serving static files. `None` resolves to `webroot`
    /// next to the running executable.
    pub web_root: Option<PathBuf>,

    /// File served when a request names a directory.
    pub dir_index: String,

    /// Number of worker threads answering queued requests.
    pub max_threads: usize,

    /// Maximum number of requests waiting for a worker (backpressure).
    pub max_pending_requests: usize,

    /// Override for the response "Server" header.
    pub server_header: Option<String>,

    /// Collect link-time registered resources when routes are sealed.
    pub auto_load_routes: bool,

    /// Deadline used by `Server::stop()` when no explicit timeout is given.
    pub shutdown_timeout_secs: u64,

    /// Largest request body the listener will buffer.
    pub max_body_bytes: usize,

    /// Listener timeouts.
    pub timeouts: TimeoutConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: "1234".to_string(),
            web_root: None,
            dir_index: "index.html".to_string(),
            max_threads: 5,
            max_pending_requests: 200,
            server_header: None,
            auto_load_routes: true,
            shutdown_timeout_secs: 300,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            timeouts: TimeoutConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Base URL composed from protocol, host and port.
    pub fn base_url(&self) -> BaseUrl {
        BaseUrl {
            protocol: self.protocol.clone(),
            host: self.host.clone(),
            port: self.port.clone(),
        }
    }
}

/// The `{protocol}://{host}:{port}/` prefix a listener is opened on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl {
    pub protocol: String,
    pub host: String,
    pub port: String,
}

impl std::fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}/", self.protocol, self.host, self.port)
    }
}

/// Timeout configuration for the listener, in seconds.
///
/// Passed to the listener at construction; not renegotiated while running.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed for a client to send the request headers.
    pub header_wait_secs: u64,

    /// Time allowed for a client to send the request body.
    pub entity_body_secs: u64,

    /// Keep-alive connections with no request in flight are closed after this long.
    pub idle_connection_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            header_wait_secs: 30,
            entity_body_secs: 30,
            idle_connection_secs: 120,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServerConfig::default();
        assert_eq!(config.protocol, "http");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.dir_index, "index.html");
        assert_eq!(config.max_threads, 5);
        assert_eq!(config.max_pending_requests, 200);
        assert!(config.auto_load_routes);
        assert!(config.server_header.is_none());
        assert_eq!(config.timeouts.idle_connection_secs, 120);
    }

    #[test]
    fn base_url_format() {
        let mut config = ServerConfig::default();
        config.host = "+".into();
        config.port = "8123".into();
        assert_eq!(config.base_url().to_string(), "http://+:8123/");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            port = "9000"
            max_threads = 2

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, "9000");
        assert_eq!(config.max_threads, 2);
        assert_eq!(config.max_pending_requests, 200);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }
}
