//! Settings that may change while the server is running.
//!
//! Workers load one snapshot per request, so a request never sees a
//! half-applied update.

use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::Arc;

/// Snapshot of the runtime-mutable settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Value of the "Server" response header, if overridden.
    pub server_header: Option<String>,
    /// Directory static files are served from.
    pub web_root: PathBuf,
    /// File served for directory requests.
    pub dir_index: String,
}

/// Atomically swappable holder shared between the server and its workers.
#[derive(Debug)]
pub struct SharedSettings {
    current: ArcSwap<RuntimeSettings>,
}

impl SharedSettings {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            current: ArcSwap::from_pointee(settings),
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<RuntimeSettings> {
        self.current.load_full()
    }

    /// Replace the whole snapshot.
    pub fn store(&self, settings: RuntimeSettings) {
        self.current.store(Arc::new(settings));
    }

    /// Apply a change to a copy of the current snapshot and publish it.
    pub fn update(&self, change: impl Fn(&mut RuntimeSettings)) {
        self.current.rcu(|current| {
            let mut next = RuntimeSettings::clone(current);
            change(&mut next);
            next
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SharedSettings {
        SharedSettings::new(RuntimeSettings {
            server_header: None,
            web_root: PathBuf::from("webroot"),
            dir_index: "index.html".into(),
        })
    }

    #[test]
    fn update_publishes_new_snapshot() {
        let shared = settings();
        let before = shared.load();

        shared.update(|s| s.server_header = Some("Ponies/1.0".into()));

        assert_eq!(before.server_header, None);
        assert_eq!(shared.load().server_header.as_deref(), Some("Ponies/1.0"));
        assert_eq!(shared.load().dir_index, "index.html");
    }
}
