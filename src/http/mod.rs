//! HTTP request/response model shared by the listener and the workers.
//!
//! # Data Flow
//! ```text
//! Listener
//!     → context.rs (RequestContext built from the buffered request)
//!     → [queue → worker → route handler]
//!     → params.rs (query / path parameter conversion)
//!     → response.rs (canned 404/500/503, static files)
//!     → ResponseWriter::finish → ResponseHandle → Listener writes to client
//! ```

pub mod context;
pub mod params;
pub mod response;

pub use context::{
    CompletedResponse, RequestContext, ResponseError, ResponseHandle, ResponseWriter, X_REQUEST_ID,
};
pub use params::ArgumentError;
