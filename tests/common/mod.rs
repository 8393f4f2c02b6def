//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::http::{Method, Request};
use bytes::Bytes;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dispatch_server::config::{BaseUrl, ServerConfig};
use dispatch_server::http::{CompletedResponse, ResponseHandle};
use dispatch_server::net::{Listener, ListenerError, RequestSink};
use dispatch_server::RequestContext;

/// Web root with a nested file and a directory carrying an index page.
pub fn web_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("subdir")).unwrap();
    fs::write(dir.path().join("subdir/file1.txt"), "This is file 1.\n").unwrap();
    fs::create_dir_all(dir.path().join("docs")).unwrap();
    fs::write(dir.path().join("docs/index.html"), "<h1>Docs</h1>").unwrap();
    dir
}

/// Loopback-bound config on an ephemeral port, with auto-loading off.
pub fn test_config(web_root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: "0".into(),
        web_root: Some(web_root.to_path_buf()),
        max_threads: 2,
        auto_load_routes: false,
        ..ServerConfig::default()
    }
}

#[derive(Default)]
struct LoopbackState {
    sink: Option<RequestSink>,
    base_url: Option<String>,
    opened: usize,
    closed: usize,
    closed_at: Option<Instant>,
    fail_next_open: bool,
}

/// In-memory listener. Requests are injected through the shared handle.
#[derive(Clone, Default)]
pub struct Loopback {
    state: Arc<Mutex<LoopbackState>>,
}

impl Loopback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener(&self) -> Box<dyn Listener> {
        Box::new(LoopbackListener { shared: self.clone() })
    }

    /// Inject a request. `None` when the listener is closed.
    pub fn send(&self, method: Method, path: &str) -> Option<ResponseHandle> {
        let sink = self.state.lock().unwrap().sink.clone()?;
        let request = Request::builder().method(method).uri(path).body(Bytes::new()).unwrap();
        let (ctx, handle) = RequestContext::from_request(request);
        sink(ctx);
        Some(handle)
    }

    /// Send a GET and wait up to five seconds for the response.
    pub fn get(&self, path: &str) -> CompletedResponse {
        let handle = self.send(Method::GET, path).expect("listener is closed");
        handle
            .wait_timeout(Duration::from_secs(5))
            .expect("no response within five seconds")
            .expect("request was dropped without a response")
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().sink.is_some()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    pub fn closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }

    pub fn closed_at(&self) -> Option<Instant> {
        self.state.lock().unwrap().closed_at
    }

    pub fn base_url(&self) -> Option<String> {
        self.state.lock().unwrap().base_url.clone()
    }

    pub fn fail_next_open(&self) {
        self.state.lock().unwrap().fail_next_open = true;
    }
}

struct LoopbackListener {
    shared: Loopback,
}

impl Listener for LoopbackListener {
    fn open(&mut self, base_url: &BaseUrl, sink: RequestSink) -> Result<(), ListenerError> {
        let mut state = self.shared.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_open) {
            return Err(ListenerError::InvalidAddress {
                address: base_url.to_string(),
                reason: "injected failure".into(),
            });
        }
        state.sink = Some(sink);
        state.base_url = Some(base_url.to_string());
        state.opened += 1;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        if state.sink.take().is_some() {
            state.closed += 1;
            state.closed_at = Some(Instant::now());
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// A gate handlers can block on until the test opens it.
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, std::sync::Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    /// Block until opened or `timeout` passes. Returns whether it was opened.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap();
        let (guard, _) = cvar.wait_timeout_while(guard, timeout, |open| !*open).unwrap();
        *guard
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
