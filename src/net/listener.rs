//! Listener abstraction and the default HTTP/1.1 listener.
//!
//! # Responsibilities
//! - Define the seam between the network and the dispatch core (`Listener`)
//! - Bind the base URL and accept connections on a private tokio runtime
//! - Buffer each request body under size and time limits
//! - Hand requests to the sink and write back whatever response comes back
//!
//! # Design Decisions
//! - The runtime belongs to the listener; closing it severs every open connection
//! - Timeouts and limits are fixed when the listener is constructed
//! - Anything other than plain `http` is refused at open time

use axum::body::{Body, HttpBody};
use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::{Bytes, BytesMut};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::net::{SocketAddr, ToSocketAddrs};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::schema::{BaseUrl, ServerConfig};
use crate::http::context::{CompletedResponse, RequestContext, X_REQUEST_ID};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::connection::{ConnectionGuard, ConnectionTracker};

/// `Server` header sent when none is configured.
pub const DEFAULT_SERVER_HEADER: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Receives every request a listener accepts.
pub type RequestSink = Arc<dyn Fn(RequestContext) + Send + Sync>;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("unsupported protocol {0:?}; only \"http\" is served")]
    UnsupportedProtocol(String),

    #[error("invalid listen address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start listener runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("listener is already open")]
    AlreadyOpen,
}

/// A source of requests.
///
/// `open` must not return before the listener accepts connections; `close`
/// must sever every connection it still holds.
pub trait Listener: Send {
    fn open(&mut self, base_url: &BaseUrl, sink: RequestSink) -> Result<(), ListenerError>;

    fn close(&mut self);

    /// Bound address while open.
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Fixed per-listener limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerLimits {
    pub header_wait: Duration,
    pub entity_body: Duration,
    pub idle_connection: Duration,
    pub max_body_bytes: usize,
}

impl ListenerLimits {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            header_wait: Duration::from_secs(config.timeouts.header_wait_secs),
            entity_body: Duration::from_secs(config.timeouts.entity_body_secs),
            idle_connection: Duration::from_secs(config.timeouts.idle_connection_secs),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

impl Default for ListenerLimits {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

struct RunningListener {
    runtime: Runtime,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
    local_addr: SocketAddr,
}

/// HTTP/1.1 listener on hyper and axum.
pub struct HttpListener {
    limits: ListenerLimits,
    running: Option<RunningListener>,
}

impl HttpListener {
    pub fn new(limits: ListenerLimits) -> Self {
        Self { limits, running: None }
    }

    pub fn limits(&self) -> ListenerLimits {
        self.limits
    }

    pub fn is_open(&self) -> bool {
        self.running.is_some()
    }

    /// Open client connections, zero when closed.
    pub fn active_connections(&self) -> usize {
        self.running.as_ref().map_or(0, |r| r.tracker.active_count())
    }
}

impl Default for HttpListener {
    fn default() -> Self {
        Self::new(ListenerLimits::default())
    }
}

impl Listener for HttpListener {
    fn open(&mut self, base_url: &BaseUrl, sink: RequestSink) -> Result<(), ListenerError> {
        if self.running.is_some() {
            return Err(ListenerError::AlreadyOpen);
        }
        if !base_url.protocol.eq_ignore_ascii_case("http") {
            return Err(ListenerError::UnsupportedProtocol(base_url.protocol.clone()));
        }

        let addr = resolve_addr(&base_url.host, &base_url.port)?;
        let std_listener =
            std::net::TcpListener::bind(addr).map_err(|source| ListenerError::Bind { addr, source })?;
        std_listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let local_addr = std_listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("dispatch-listener")
            .enable_all()
            .build()
            .map_err(ListenerError::Runtime)?;
        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(std_listener).map_err(|source| ListenerError::Bind { addr, source })?
        };

        let shutdown = Shutdown::new();
        let tracker = ConnectionTracker::new();
        let app = build_router(sink, self.limits);
        runtime.spawn(accept_loop(
            listener,
            app,
            self.limits,
            shutdown.subscribe(),
            tracker.clone(),
        ));

        tracing::info!(address = %local_addr, base_url = %base_url, "Listener bound");
        self.running = Some(RunningListener {
            runtime,
            shutdown,
            tracker,
            local_addr,
        });
        Ok(())
    }

    fn close(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let open_connections = running.tracker.active_count();
        running.shutdown.trigger();
        // Dropping the tasks closes their sockets.
        if tokio::runtime::Handle::try_current().is_ok() {
            running.runtime.shutdown_background();
        } else {
            running.runtime.shutdown_timeout(Duration::from_secs(1));
        }
        tracing::info!(address = %running.local_addr, open_connections, "Listener closed");
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }
}

impl Drop for HttpListener {
    fn drop(&mut self) {
        self.close();
    }
}

fn resolve_addr(host: &str, port: &str) -> Result<SocketAddr, ListenerError> {
    let invalid = |reason: String| ListenerError::InvalidAddress {
        address: format!("{host}:{port}"),
        reason,
    };
    let port: u16 = port.parse().map_err(|_| invalid("port is not a number".into()))?;
    if host == "+" || host == "*" {
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }

    let mut addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| invalid(e.to_string()))?
        .collect();
    addrs.sort_by_key(|addr| !addr.is_ipv4());
    addrs
        .into_iter()
        .next()
        .ok_or_else(|| invalid("host resolved to no addresses".into()))
}

struct ListenerState {
    sink: RequestSink,
    limits: ListenerLimits,
}

fn build_router(sink: RequestSink, limits: ListenerLimits) -> Router {
    let request_id = HeaderName::from_static(X_REQUEST_ID);
    Router::new()
        .fallback(dispatch_request)
        .with_state(Arc::new(ListenerState { sink, limits }))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::SERVER,
            HeaderValue::from_static(DEFAULT_SERVER_HEADER),
        ))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}

fn http1_builder(limits: ListenerLimits) -> http1::Builder {
    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(limits.header_wait)
        .keep_alive(true);
    builder
}

async fn accept_loop(
    listener: TcpListener,
    app: Router,
    limits: ListenerLimits,
    mut shutdown: broadcast::Receiver<()>,
    tracker: ConnectionTracker,
) {
    let builder = http1_builder(limits);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    let _ = stream.set_nodelay(true);
                    let guard = tracker.track();
                    tokio::spawn(serve_connection(
                        stream,
                        peer,
                        app.clone(),
                        builder.clone(),
                        limits.idle_connection,
                        guard,
                    ));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                }
            }
        }
    }
    tracing::debug!("Accept loop stopped");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    builder: http1::Builder,
    idle_timeout: Duration,
    guard: ConnectionGuard,
) {
    let activity = guard.activity();
    let service = service_fn(move |request: Request<Incoming>| {
        let app = app.clone();
        let busy = activity.begin();
        async move {
            let response = app.oneshot(request).await;
            drop(busy);
            response
        }
    });

    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let idle = guard.activity();
    let tick = (idle_timeout / 4).clamp(Duration::from_millis(10), Duration::from_secs(1));
    let mut closing = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    if !e.is_incomplete_message() && !e.is_canceled() && !e.is_closed() {
                        tracing::debug!(connection_id = %guard.id(), peer = %peer, error = %e, "Connection error");
                    }
                }
                break;
            }
            _ = tokio::time::sleep(tick), if !closing => {
                if idle.idle_for().is_some_and(|elapsed| elapsed >= idle_timeout) {
                    tracing::trace!(connection_id = %guard.id(), "Closing idle connection");
                    conn.as_mut().graceful_shutdown();
                    closing = true;
                }
            }
        }
    }
}

#[derive(Debug)]
enum BodyError {
    TooLarge,
    Unreadable(axum::Error),
}

async fn read_body(mut body: Body, limit: usize) -> Result<Bytes, BodyError> {
    let mut buffer = BytesMut::new();
    while let Some(frame) = std::future::poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await {
        let frame = frame.map_err(BodyError::Unreadable)?;
        if let Ok(data) = frame.into_data() {
            if buffer.len() + data.len() > limit {
                return Err(BodyError::TooLarge);
            }
            buffer.extend_from_slice(&data);
        }
    }
    Ok(buffer.freeze())
}

fn declared_length(headers: &axum::http::HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

async fn dispatch_request(State(state): State<Arc<ListenerState>>, request: Request) -> Response {
    let limits = state.limits;
    let (parts, body) = request.into_parts();

    if declared_length(&parts.headers).is_some_and(|len| len > limits.max_body_bytes) {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }
    let body = match tokio::time::timeout(limits.entity_body, read_body(body, limits.max_body_bytes)).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(BodyError::TooLarge)) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
        Ok(Err(BodyError::Unreadable(e))) => {
            tracing::debug!(error = %e, "Unreadable request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
        Err(_) => return StatusCode::REQUEST_TIMEOUT.into_response(),
    };

    let (ctx, handle) = RequestContext::from_request(axum::http::Request::from_parts(parts, body));
    (state.sink)(ctx);

    match handle.recv().await {
        Some(completed) => into_response(completed),
        None => {
            tracing::warn!("Request dropped without a response");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

fn into_response(completed: CompletedResponse) -> Response {
    let CompletedResponse { status, headers, body } = completed;
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url(protocol: &str, host: &str, port: &str) -> BaseUrl {
        BaseUrl {
            protocol: protocol.into(),
            host: host.into(),
            port: port.into(),
        }
    }

    #[test]
    fn wildcard_hosts_bind_everything() {
        assert_eq!(resolve_addr("+", "8080").unwrap(), SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(resolve_addr("*", "0").unwrap().port(), 0);
    }

    #[test]
    fn localhost_prefers_ipv4() {
        let addr = resolve_addr("localhost", "1234").unwrap();
        assert!(addr.is_ipv4() || addr.ip().is_loopback());
        assert_eq!(addr.port(), 1234);
    }

    #[test]
    fn bad_port_is_invalid_address() {
        assert!(matches!(
            resolve_addr("localhost", "http"),
            Err(ListenerError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn https_is_refused() {
        let mut listener = HttpListener::default();
        let sink: RequestSink = Arc::new(|_ctx: RequestContext| {});
        let err = listener.open(&base_url("https", "127.0.0.1", "0"), sink).unwrap_err();
        assert!(matches!(err, ListenerError::UnsupportedProtocol(p) if p == "https"));
        assert!(!listener.is_open());
    }

    #[test]
    fn open_reports_ephemeral_port_and_close_releases_it() {
        let mut listener = HttpListener::default();
        let sink: RequestSink = Arc::new(|_ctx: RequestContext| {});
        listener.open(&base_url("http", "127.0.0.1", "0"), sink.clone()).unwrap();

        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(matches!(
            listener.open(&base_url("http", "127.0.0.1", "0"), sink),
            Err(ListenerError::AlreadyOpen)
        ));

        listener.close();
        assert!(listener.local_addr().is_none());
        assert!(std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(200)).is_err());
    }

    #[test]
    fn limits_follow_config() {
        let mut config = ServerConfig::default();
        config.timeouts.idle_connection_secs = 7;
        config.max_body_bytes = 10;
        let limits = ListenerLimits::from_config(&config);
        assert_eq!(limits.idle_connection, Duration::from_secs(7));
        assert_eq!(limits.max_body_bytes, 10);
    }
}
