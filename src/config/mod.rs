//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated)
//!     → Server (startup-only fields) + runtime.rs (hot fields)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → atomic swap of RuntimeSettings
//!     → workers observe new settings on their next request
//! ```
//!
//! # Design Decisions
//! - Protocol, host, port and thread count are frozen while running
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod runtime;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use runtime::{RuntimeSettings, SharedSettings};
pub use schema::{BaseUrl, LogFormat, LoggingConfig, ServerConfig, TimeoutConfig};
pub use validation::ValidationError;
