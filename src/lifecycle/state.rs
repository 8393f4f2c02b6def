//! Server state machine.
//!
//! ```text
//! Stopped → Starting → Running → Stopping → Stopped
//!              │
//!              └── (failure) → Stopped
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle state of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl From<u8> for ServerState {
    fn from(value: u8) -> Self {
        match value {
            1 => ServerState::Starting,
            2 => ServerState::Running,
            3 => ServerState::Stopping,
            _ => ServerState::Stopped,
        }
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServerState::Stopped => "stopped",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Shared, cheaply clonable view of a server's state.
///
/// Only the lifecycle writes it; anyone holding a clone may read it.
#[derive(Debug, Clone)]
pub struct StateCell {
    state: Arc<AtomicU8>,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(ServerState::Stopped as u8)),
        }
    }

    pub fn get(&self) -> ServerState {
        ServerState::from(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ServerState) {
        let previous = ServerState::from(self.state.swap(state as u8, Ordering::AcqRel));
        tracing::debug!(from = %previous, to = %state, "Server state changed");
    }

    pub fn is_running(&self) -> bool {
        self.get() == ServerState::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.get() == ServerState::Stopped
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
