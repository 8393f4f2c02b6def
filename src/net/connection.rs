//! Open-connection bookkeeping for the HTTP listener.
//!
//! # Responsibilities
//! - Number connections per listener run, for log correlation
//! - Count open connections
//! - Record per-connection activity so idle keep-alive connections can be closed

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::observability::metrics;

/// Sequence number of a connection within one listener run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Counters {
    open: AtomicUsize,
    issued: AtomicU64,
}

/// Issues connection guards and counts the ones still alive.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    counters: Arc<Counters>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an accepted connection; it counts as open until the guard drops.
    pub fn track(&self) -> ConnectionGuard {
        let id = ConnectionId(self.counters.issued.fetch_add(1, Ordering::Relaxed) + 1);
        let open = self.counters.open.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_active_connections(open);
        tracing::trace!(connection_id = %id, open, "Connection accepted");
        ConnectionGuard {
            counters: Arc::clone(&self.counters),
            id,
            activity: Arc::new(ConnectionActivity::new()),
        }
    }

    pub fn active_count(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }
}

/// Held by the task serving one connection.
#[derive(Debug)]
pub struct ConnectionGuard {
    counters: Arc<Counters>,
    id: ConnectionId,
    activity: Arc<ConnectionActivity>,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn activity(&self) -> Arc<ConnectionActivity> {
        Arc::clone(&self.activity)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let open = self.counters.open.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::record_active_connections(open);
        tracing::trace!(connection_id = %self.id, open, "Connection released");
    }
}

/// In-flight request count and last activity of one connection.
#[derive(Debug)]
pub struct ConnectionActivity {
    in_flight: AtomicUsize,
    last_active: Mutex<Instant>,
}

impl ConnectionActivity {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            last_active: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_active.lock().expect("connection activity mutex poisoned") = Instant::now();
    }

    /// Mark a request as in flight until the returned guard drops.
    pub fn begin(self: &Arc<Self>) -> RequestActivity {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touch();
        RequestActivity {
            activity: Arc::clone(self),
        }
    }

    /// How long the connection has been idle; `None` while a request is in flight.
    pub fn idle_for(&self) -> Option<Duration> {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return None;
        }
        Some(
            self.last_active
                .lock()
                .expect("connection activity mutex poisoned")
                .elapsed(),
        )
    }
}

/// Marks one request in flight on a connection.
#[derive(Debug)]
pub struct RequestActivity {
    activity: Arc<ConnectionActivity>,
}

impl Drop for RequestActivity {
    fn drop(&mut self) {
        self.activity.touch();
        self.activity.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
