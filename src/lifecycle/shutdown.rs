//! Shutdown signalling and deadline accounting.

use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Broadcast shutdown signal for the listener's async tasks.
///
/// Cloning shares the same channel.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Time budget of one stop call.
///
/// The first half is the graceful phase; the rest is spent waiting for
/// workers that outlived it.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownDeadline {
    started: Instant,
    timeout: Duration,
}

impl ShutdownDeadline {
    pub fn start(timeout: Duration) -> Self {
        Self {
            started: Instant::now(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// End of the graceful phase. `None` when it lies beyond what `Instant` can represent.
    pub fn graceful_deadline(&self) -> Option<Instant> {
        self.started.checked_add(self.timeout / 2)
    }

    /// End of the whole stop call. `None` means no deadline.
    pub fn deadline(&self) -> Option<Instant> {
        self.started.checked_add(self.timeout)
    }

    /// Time left before `until`, clamped at zero. `None` when unbounded.
    pub fn remaining(until: Option<Instant>) -> Option<Duration> {
        until.map(|until| until.saturating_duration_since(Instant::now()))
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graceful_phase_is_half() {
        let deadline = ShutdownDeadline::start(Duration::from_secs(10));
        assert_eq!(deadline.graceful_deadline().unwrap() - deadline.started, Duration::from_secs(5));
        assert_eq!(deadline.deadline().unwrap() - deadline.started, Duration::from_secs(10));
    }

    #[test]
    fn unrepresentable_timeout_has_no_deadline() {
        let deadline = ShutdownDeadline::start(Duration::MAX);
        assert_eq!(deadline.deadline(), None);
        assert_eq!(ShutdownDeadline::remaining(deadline.deadline()), None);
    }

    #[test]
    fn remaining_clamps_at_zero() {
        let deadline = ShutdownDeadline::start(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(ShutdownDeadline::remaining(deadline.deadline()), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn trigger_reaches_subscribers() {
        let shutdown = Shutdown::new();
        let mut first = shutdown.subscribe();
        let mut second = shutdown.clone().subscribe();
        shutdown.trigger();
        assert!(first.recv().await.is_ok());
        assert!(second.recv().await.is_ok());
    }
}
