//! Dispatch engine: queue, workers and request processing.
//!
//! # Data Flow
//! ```text
//! Listener sink
//!     → queue.rs (admit or 503, FIFO, readiness / stop signal)
//!     → worker.rs (N threads: wait → dequeue → Dispatcher::dispatch)
//!         → RouteTable::resolve → handler
//!         → static_files.rs (GET fallback under the web root)
//!         → 404
//!     → response finalized exactly once
//! ```
//!
//! # Design Decisions
//! - Handlers run on dedicated OS threads, off the listener's async runtime
//! - The queue is the only state shared between the listener and the workers

pub mod queue;
pub mod static_files;
pub mod worker;

pub use queue::{Admission, RequestQueue, Wake};
pub use worker::{Dispatcher, WorkerPool};
