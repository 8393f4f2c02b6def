//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop on the listener's runtime)
//!     → connection.rs (tracking, idle detection)
//!     → hyper HTTP/1.1 + axum fallback (body buffering, request ID, tracing)
//!     → RequestSink (hand off to the dispatch core)
//!     → response written back when the worker finishes
//! ```
//!
//! # Design Decisions
//! - The core only sees the `Listener` trait; tests plug in their own
//! - Each connection is tracked so idle keep-alives can be closed

pub mod connection;
pub mod listener;

pub use listener::{HttpListener, Listener, ListenerError, ListenerLimits, RequestSink};
