//! Server façade.
//!
//! # Responsibilities
//! - Hold the configuration and guard the start-time fields while running
//! - Own the route table and the resources feeding it
//! - Drive the lifecycle (start, graceful-then-forced stop)
//! - Publish runtime settings (server header, web root, directory index)
//!
//! # Design Decisions
//! - Setters for protocol, host, port, thread count and queue capacity fail
//!   with a state error unless stopped; the running configuration never changes
//! - Runtime settings are swapped atomically and apply from the next request
//! - Dropping a running server stops it with the configured timeout

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::RecommendedWatcher;

use crate::config::loader::{load_config, prepare_web_root};
use crate::config::runtime::{RuntimeSettings, SharedSettings};
use crate::config::schema::{BaseUrl, ServerConfig};
use crate::config::validation::{
    check_dir_index, check_host, check_max_pending_requests, check_max_threads, check_port,
    check_protocol, validate_config,
};
use crate::config::watcher::ConfigWatcher;
use crate::config::ConfigError;
use crate::dispatch::worker::Dispatcher;
use crate::error::ServerError;
use crate::http::context::RequestContext;
use crate::lifecycle::controller::{Lifecycle, StartPlan, StopReport};
use crate::lifecycle::hooks::{HookError, HookStage};
use crate::lifecycle::state::{ServerState, StateCell};
use crate::net::listener::{HttpListener, Listener, ListenerLimits};
use crate::routing::matcher::{InvalidMethod, RouteMatch, RouteMethod};
use crate::routing::router::{invoker, HandlerResult, RouteError, RouteTable};
use crate::routing::scanner::{Resource, RouteScanner};

/// An embeddable HTTP request-dispatch server.
pub struct Server {
    config: ServerConfig,
    settings: Arc<SharedSettings>,
    routes: RouteTable,
    resources: Vec<Arc<dyn Resource>>,
    scanned: bool,
    shutdown_timeout: Duration,
    lifecycle: Lifecycle,
}

impl Server {
    /// Server with the default configuration and the default HTTP listener.
    pub fn new() -> Result<Self, ServerError> {
        Self::with_config(ServerConfig::default())
    }

    /// Server built from a validated configuration, using the default HTTP listener.
    pub fn with_config(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = HttpListener::new(ListenerLimits::from_config(&config));
        Self::with_listener(config, Box::new(listener))
    }

    /// Server using a caller-supplied listener.
    pub fn with_listener(config: ServerConfig, listener: Box<dyn Listener>) -> Result<Self, ServerError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let web_root = prepare_web_root(config.web_root.as_deref())?;
        let settings = Arc::new(SharedSettings::new(RuntimeSettings {
            server_header: config.server_header.clone(),
            web_root,
            dir_index: config.dir_index.clone(),
        }));
        let lifecycle = Lifecycle::new(listener, config.max_pending_requests);
        let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);

        Ok(Self {
            config,
            settings,
            routes: RouteTable::new(),
            resources: Vec::new(),
            scanned: false,
            shutdown_timeout,
            lifecycle,
        })
    }

    /// Server configured from a TOML file.
    pub fn from_config_file(path: &Path) -> Result<Self, ServerError> {
        Self::with_config(load_config(path)?)
    }

    // --- configuration -------------------------------------------------

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn require_stopped(&self, operation: &'static str) -> Result<(), ServerError> {
        match self.state() {
            ServerState::Stopped => Ok(()),
            state => Err(ServerError::State { operation, state }),
        }
    }

    pub fn protocol(&self) -> &str {
        &self.config.protocol
    }

    pub fn set_protocol(&mut self, protocol: impl Into<String>) -> Result<(), ServerError> {
        self.require_stopped("change the protocol")?;
        let protocol = protocol.into();
        check_protocol(&protocol).map_err(ConfigError::from)?;
        self.config.protocol = protocol;
        Ok(())
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn set_host(&mut self, host: impl Into<String>) -> Result<(), ServerError> {
        self.require_stopped("change the host")?;
        let host = host.into();
        check_host(&host).map_err(ConfigError::from)?;
        self.config.host = host;
        Ok(())
    }

    pub fn port(&self) -> &str {
        &self.config.port
    }

    pub fn set_port(&mut self, port: impl Into<String>) -> Result<(), ServerError> {
        self.require_stopped("change the port")?;
        let port = port.into();
        check_port(&port).map_err(ConfigError::from)?;
        self.config.port = port;
        Ok(())
    }

    pub fn max_threads(&self) -> usize {
        self.config.max_threads
    }

    pub fn set_max_threads(&mut self, max_threads: usize) -> Result<(), ServerError> {
        self.require_stopped("change the thread count")?;
        check_max_threads(max_threads).map_err(ConfigError::from)?;
        self.config.max_threads = max_threads;
        Ok(())
    }

    pub fn max_pending_requests(&self) -> usize {
        self.config.max_pending_requests
    }

    pub fn set_max_pending_requests(&mut self, capacity: usize) -> Result<(), ServerError> {
        self.require_stopped("change the queue capacity")?;
        check_max_pending_requests(capacity).map_err(ConfigError::from)?;
        self.lifecycle.resize_queue(capacity)?;
        self.config.max_pending_requests = capacity;
        Ok(())
    }

    pub fn set_auto_load_routes(&mut self, enabled: bool) -> Result<(), ServerError> {
        self.require_stopped("change route auto-loading")?;
        self.config.auto_load_routes = enabled;
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Budget used by `stop()` and by drop. Kept exactly; the config mirror rounds up to whole seconds.
    pub fn set_shutdown_timeout(&mut self, timeout: Duration) {
        self.shutdown_timeout = timeout;
        let whole = timeout.as_secs();
        self.config.shutdown_timeout_secs = if timeout.subsec_nanos() > 0 { whole.saturating_add(1) } else { whole };
    }

    /// Replace the listener. Only while stopped.
    pub fn set_listener(&mut self, listener: Box<dyn Listener>) -> Result<(), ServerError> {
        self.lifecycle.replace_listener(listener)
    }

    /// `{protocol}://{host}:{port}/`
    pub fn base_url(&self) -> BaseUrl {
        self.config.base_url()
    }

    // --- runtime settings ----------------------------------------------

    pub fn runtime_settings(&self) -> Arc<RuntimeSettings> {
        self.settings.load()
    }

    pub fn server_header(&self) -> Option<String> {
        self.settings.load().server_header.clone()
    }

    /// Value of the `Server` response header; `None` keeps the listener's default.
    pub fn set_server_header(&mut self, value: Option<String>) {
        self.config.server_header = value.clone();
        self.settings.update(|s| s.server_header = value.clone());
    }

    pub fn web_root(&self) -> PathBuf {
        self.settings.load().web_root.clone()
    }

    /// Change the static file root, creating the directory if needed.
    pub fn set_web_root(&mut self, path: impl Into<PathBuf>) -> Result<(), ServerError> {
        let path: PathBuf = path.into();
        let path = prepare_web_root(Some(&path))?;
        self.config.web_root = Some(path.clone());
        self.settings.update(|s| s.web_root = path.clone());
        Ok(())
    }

    pub fn dir_index(&self) -> String {
        self.settings.load().dir_index.clone()
    }

    pub fn set_dir_index(&mut self, dir_index: impl Into<String>) -> Result<(), ServerError> {
        let dir_index = dir_index.into();
        check_dir_index(&dir_index).map_err(ConfigError::from)?;
        self.config.dir_index = dir_index.clone();
        self.settings.update(|s| s.dir_index = dir_index.clone());
        Ok(())
    }

    /// Watch a config file and hot-apply its runtime settings.
    ///
    /// Keep the returned watcher alive for as long as reloads are wanted.
    pub fn watch_config(&self, path: &Path) -> Result<RecommendedWatcher, notify::Error> {
        ConfigWatcher::new(path, Arc::clone(&self.settings)).run()
    }

    // --- routes --------------------------------------------------------

    /// Register a handler. Fails once the route table has been sealed by a start.
    ///
    /// `method` is a `Method`, a `RouteMethod`, or a string token where `*` means any method.
    pub fn add_route<M, F>(&mut self, method: M, pattern: &str, handler: F) -> Result<(), ServerError>
    where
        M: TryInto<RouteMethod>,
        M::Error: Into<InvalidMethod>,
        F: Fn(&mut RequestContext, &RouteMatch) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_route_with_priority(method, pattern, 0, handler)
    }

    /// Register a handler tried before lower-priority routes.
    pub fn add_route_with_priority<M, F>(
        &mut self,
        method: M,
        pattern: &str,
        priority: i32,
        handler: F,
    ) -> Result<(), ServerError>
    where
        M: TryInto<RouteMethod>,
        M::Error: Into<InvalidMethod>,
        F: Fn(&mut RequestContext, &RouteMatch) -> HandlerResult + Send + Sync + 'static,
    {
        let method: RouteMethod = method
            .try_into()
            .map_err(|e| RouteError::InvalidMethod(e.into()))?;
        self.routes
            .add_with_priority(method, pattern, priority, invoker(handler))?;
        Ok(())
    }

    /// Register a resource whose routes are collected at the first start.
    pub fn add_resource(&mut self, resource: Arc<dyn Resource>) -> Result<(), ServerError> {
        if self.routes.is_sealed() {
            return Err(RouteError::Sealed.into());
        }
        self.resources.push(resource);
        Ok(())
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    // --- hooks ---------------------------------------------------------

    pub fn on_before_start<F>(&mut self, hook: F)
    where
        F: FnMut() -> Result<(), HookError> + Send + 'static,
    {
        self.lifecycle.add_hook(HookStage::BeforeStart, hook);
    }

    pub fn on_after_start<F>(&mut self, hook: F)
    where
        F: FnMut() -> Result<(), HookError> + Send + 'static,
    {
        self.lifecycle.add_hook(HookStage::AfterStart, hook);
    }

    pub fn on_before_stop<F>(&mut self, hook: F)
    where
        F: FnMut() -> Result<(), HookError> + Send + 'static,
    {
        self.lifecycle.add_hook(HookStage::BeforeStop, hook);
    }

    pub fn on_after_stop<F>(&mut self, hook: F)
    where
        F: FnMut() -> Result<(), HookError> + Send + 'static,
    {
        self.lifecycle.add_hook(HookStage::AfterStop, hook);
    }

    // --- lifecycle -----------------------------------------------------

    pub fn state(&self) -> ServerState {
        self.lifecycle.state()
    }

    /// Clonable view of the state, readable from other threads.
    pub fn state_cell(&self) -> StateCell {
        self.lifecycle.state_cell()
    }

    pub fn is_listening(&self) -> bool {
        self.state() == ServerState::Running
    }

    /// Address the listener is bound to while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.listener().local_addr()
    }

    /// Requests waiting for a worker.
    pub fn pending_requests(&self) -> usize {
        self.lifecycle.queue().len()
    }

    /// Summary of the most recent stop.
    pub fn last_stop(&self) -> Option<StopReport> {
        self.lifecycle.last_stop()
    }

    /// Start serving. Only valid while stopped.
    pub fn start(&mut self) -> Result<(), ServerError> {
        let scanner = RouteScanner::new(self.config.auto_load_routes);
        let base_url = self.config.base_url();
        let threads = self.config.max_threads;
        let routes = &mut self.routes;
        let resources = &self.resources;
        let scanned = &mut self.scanned;
        let settings = &self.settings;

        self.lifecycle.start(move || {
            if !*scanned {
                let added = scanner.populate(routes, resources)?;
                tracing::debug!(routes = added, "Resources scanned");
                *scanned = true;
            }
            routes.seal();
            Ok(StartPlan {
                base_url,
                threads,
                dispatcher: Arc::new(Dispatcher::new(routes.clone(), Arc::clone(settings))),
            })
        })
    }

    /// Stop with the configured shutdown timeout.
    pub fn stop(&mut self) -> Result<(), ServerError> {
        self.stop_with_timeout(self.shutdown_timeout())
    }

    /// Stop within `timeout`: graceful for the first half, forced after.
    pub fn stop_with_timeout(&mut self, timeout: Duration) -> Result<(), ServerError> {
        self.lifecycle.stop(timeout)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.state() == ServerState::Running {
            if let Err(e) = self.stop() {
                tracing::warn!(error = %e, "Stop on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("base_url", &self.config.base_url().to_string())
            .field("state", &self.state())
            .field("max_threads", &self.config.max_threads)
            .field("routes", &self.routes.len())
            .field("resources", &self.resources.len())
            .finish()
    }
}
