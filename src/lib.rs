//! Embeddable HTTP request-dispatch server.
//!
//! Requests arrive through a `Listener`, wait in a bounded queue, and are
//! processed by a fixed pool of worker threads that resolve them against an
//! ordered route table, falling back to static files under a web root.
//!
//! ```text
//!  Listener ──▶ RequestQueue ──▶ WorkerPool ──▶ RouteTable / web root
//!     ▲          (503 when full)   (N threads)        │
//!     └──────────── completed response ◀──────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod dispatch;
pub mod http;
pub mod net;
pub mod routing;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub mod server;

pub use config::ServerConfig;
pub use error::ServerError;
pub use http::{ArgumentError, RequestContext};
pub use lifecycle::ServerState;
pub use routing::{AutoResource, HandlerResult, Resource, RouteDescriptor, RouteMatch, RouteMethod};
pub use server::Server;

// Re-exported for `inventory::submit!` in downstream crates.
pub use inventory;
