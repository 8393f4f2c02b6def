//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at first start):
//!     Resource[] (manual + auto-registered)
//!     → scanner.rs (RouteDescriptor list)
//!     → router.rs (compile patterns, sort by priority, seal)
//!
//! Incoming Request (method, decoded path)
//!     → router.rs (ordered scan)
//!     → matcher.rs (method + anchored pattern)
//!     → Return: matched entry with captures, or None
//! ```
//!
//! # Design Decisions
//! - Routes compiled once, immutable after sealing
//! - Deterministic: same registration sequence always resolves the same way
//! - First match wins (ordered by priority, then registration order)

pub mod matcher;
pub mod router;
pub mod scanner;

pub use matcher::{InvalidMethod, PathPattern, RouteMatch, RouteMethod};
pub use router::{invoker, HandlerError, HandlerResult, Invoker, RouteEntry, RouteError, RouteTable};
pub use scanner::{AutoResource, Resource, RouteDescriptor, RouteScanner};
