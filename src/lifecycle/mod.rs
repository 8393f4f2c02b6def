//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Start (controller.rs):
//!     before_start hooks → seal routes → open queue → open listener
//!     → spawn workers → after_start hooks → Running
//!     (any failure: halt queue, close listener, join workers → Stopped)
//!
//! Stop (controller.rs, shutdown.rs):
//!     before_stop hooks → stop admitting → wait T/2 for workers
//!     → halt queue, close listener → wait until T → detach stragglers
//!     → 503 leftovers → Stopped → after_stop hooks
//! ```
//!
//! # Design Decisions
//! - Start and stop take `&mut self`, so they can never overlap
//! - Stop always returns within its timeout, whatever the handlers do

pub mod controller;
pub mod hooks;
pub mod shutdown;
pub mod signals;
pub mod state;

pub use controller::{Lifecycle, StartPlan, StopReport};
pub use hooks::{HookError, HookFailure, HookStage};
pub use shutdown::{Shutdown, ShutdownDeadline};
pub use state::{ServerState, StateCell};
