//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured `tracing` events, request span per dispatch)
//!     → metrics.rs (counters, gauges, histograms via the `metrics` facade)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → whatever recorder the embedding application installs
//! ```
//!
//! # Design Decisions
//! - Request ID flows from the listener into every worker log line
//! - Metrics are cheap no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
