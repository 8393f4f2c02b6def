//! Configuration file watcher for hot reload.
//!
//! Only the runtime-mutable settings (server header, web root, directory
//! index) are applied to a running server; everything else needs a restart.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::loader::{load_config, prepare_web_root, ConfigError};
use crate::config::runtime::{RuntimeSettings, SharedSettings};
use crate::config::schema::ServerConfig;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    settings: Arc<SharedSettings>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher publishing into `settings`.
    pub fn new(path: &Path, settings: Arc<SharedSettings>) -> Self {
        Self {
            path: path.to_path_buf(),
            settings,
        }
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for as long as reloads are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let settings = self.settings;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading...");
                        match load_config(&path).and_then(|config| apply_reload(&config, &settings)) {
                            Ok(()) => tracing::info!("Runtime settings reloaded"),
                            Err(e) => {
                                tracing::error!(
                                    "Failed to reload config: {}. Keeping current configuration.",
                                    e
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Publish the runtime-mutable part of a freshly loaded configuration.
pub fn apply_reload(config: &ServerConfig, settings: &SharedSettings) -> Result<(), ConfigError> {
    let web_root = prepare_web_root(config.web_root.as_deref())?;
    settings.store(RuntimeSettings {
        server_header: config.server_header.clone(),
        web_root,
        dir_index: config.dir_index.clone(),
    });
    Ok(())
}
