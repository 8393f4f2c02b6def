//! Top-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::lifecycle::hooks::HookFailure;
use crate::lifecycle::state::ServerState;
use crate::net::listener::ListenerError;
use crate::routing::router::RouteError;

/// Errors surfaced by `Server`.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Operation not allowed in the current lifecycle state.
    #[error("cannot {operation} while the server is {state}")]
    State {
        operation: &'static str,
        state: ServerState,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("listener failed: {0}")]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Hook(#[from] HookFailure),

    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

impl ServerError {
    pub fn is_state_conflict(&self) -> bool {
        matches!(self, ServerError::State { .. })
    }
}
