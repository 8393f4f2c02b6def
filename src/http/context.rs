//! Per-request connection context.
//!
//! # Responsibilities
//! - Carry the parsed request (method, path, query, headers, body)
//! - Buffer the response a handler writes
//! - Hand the finished response back to the listener exactly once
//!
//! # Design Decisions
//! - `RequestContext` is move-only: whoever holds it owns the request
//! - Finishing consumes the reply channel; a second finish is an error
//! - Dropping an unfinished context closes the channel, which the listener
//!   reports as an abandoned request

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri};
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;

/// Header carrying the request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Errors raised while writing a response.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response was already finished")]
    AlreadyFinished,

    #[error("client is no longer waiting for the response")]
    ClientGone,

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("failed to serialize response body: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A response ready to be written to the wire.
#[derive(Debug, Clone)]
pub struct CompletedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CompletedResponse {
    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Receiving end of a request's response, held by whoever submitted the request.
#[derive(Debug)]
pub struct ResponseHandle {
    rx: oneshot::Receiver<CompletedResponse>,
}

impl ResponseHandle {
    /// Wait asynchronously. `None` means the request was abandoned unanswered.
    pub async fn recv(self) -> Option<CompletedResponse> {
        self.rx.await.ok()
    }

    /// Block the current thread until the response arrives.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> Option<CompletedResponse> {
        self.rx.blocking_recv().ok()
    }

    /// Block for at most `timeout`. `Err(self)` is returned when nothing arrived yet.
    pub fn wait_timeout(mut self, timeout: Duration) -> Result<Option<CompletedResponse>, Self> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.rx.try_recv() {
                Ok(response) => return Ok(Some(response)),
                Err(oneshot::error::TryRecvError::Closed) => return Ok(None),
                Err(oneshot::error::TryRecvError::Empty) => {
                    if Instant::now() >= deadline {
                        return Err(self);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
    }
}

/// Response under construction.
#[derive(Debug)]
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    reply: Option<oneshot::Sender<CompletedResponse>>,
}

impl ResponseWriter {
    fn new(reply: oneshot::Sender<CompletedResponse>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
            reply: Some(reply),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_finished(&self) -> bool {
        self.reply.is_none()
    }

    fn ensure_open(&self) -> Result<(), ResponseError> {
        if self.is_finished() {
            return Err(ResponseError::AlreadyFinished);
        }
        Ok(())
    }

    pub fn set_status(&mut self, status: StatusCode) -> Result<(), ResponseError> {
        self.ensure_open()?;
        self.status = status;
        Ok(())
    }

    /// Set the status without any checks. Used as the last resort when
    /// writing an error response itself failed.
    pub fn force_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Insert (replace) a header.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), ResponseError> {
        self.ensure_open()?;
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ResponseError::InvalidHeader(e.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| ResponseError::InvalidHeader(e.to_string()))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Append raw bytes to the body.
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), ResponseError> {
        self.ensure_open()?;
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    /// Discard any body written so far.
    pub fn clear_body(&mut self) -> Result<(), ResponseError> {
        self.ensure_open()?;
        self.body.clear();
        Ok(())
    }

    /// Discard status, headers and body written so far. The `Server` header survives.
    pub fn reset(&mut self) -> Result<(), ResponseError> {
        self.ensure_open()?;
        let server = self.headers.remove(header::SERVER);
        self.headers.clear();
        if let Some(server) = server {
            self.headers.insert(header::SERVER, server);
        }
        self.status = StatusCode::OK;
        self.body.clear();
        Ok(())
    }

    /// Replace the body and content type in one go.
    pub fn send_bytes(&mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Result<(), ResponseError> {
        self.ensure_open()?;
        self.set_header(header::CONTENT_TYPE.as_str(), content_type)?;
        self.body = body.into();
        Ok(())
    }

    pub fn send_text(&mut self, text: &str) -> Result<(), ResponseError> {
        self.send_bytes("text/plain; charset=utf-8", text.as_bytes())
    }

    pub fn send_json<T: serde::Serialize>(&mut self, value: &T) -> Result<(), ResponseError> {
        let body = serde_json::to_vec(value)?;
        self.send_bytes("application/json", body)
    }

    /// Hand the response to the listener. Consumes the reply channel.
    pub fn finish(&mut self) -> Result<(), ResponseError> {
        let reply = self.reply.take().ok_or(ResponseError::AlreadyFinished)?;
        let response = CompletedResponse {
            status: self.status,
            headers: std::mem::take(&mut self.headers),
            body: Bytes::from(std::mem::take(&mut self.body)),
        };
        reply.send(response).map_err(|_| ResponseError::ClientGone)
    }
}

/// A pending request together with the writer for its response.
#[derive(Debug)]
pub struct RequestContext {
    request_id: String,
    method: Method,
    uri: Uri,
    path: String,
    headers: HeaderMap,
    body: Bytes,
    received_at: Instant,
    response: ResponseWriter,
}

impl RequestContext {
    /// Build a context from a buffered request.
    ///
    /// Returns the context and the handle its response will be delivered to.
    pub fn from_request(request: Request<Bytes>) -> (Self, ResponseHandle) {
        let (parts, body) = request.into_parts();
        let (tx, rx) = oneshot::channel();

        let request_id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let path = percent_decode_str(parts.uri.path())
            .decode_utf8_lossy()
            .into_owned();

        let context = Self {
            request_id,
            method: parts.method,
            uri: parts.uri,
            path,
            headers: parts.headers,
            body,
            received_at: Instant::now(),
            response: ResponseWriter::new(tx),
        };
        (context, ResponseHandle { rx })
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Percent-decoded request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Time since the listener handed the request over.
    pub fn elapsed(&self) -> Duration {
        self.received_at.elapsed()
    }

    pub fn response(&self) -> &ResponseWriter {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseWriter {
        &mut self.response
    }

    /// Finalize the response.
    pub fn finish(&mut self) -> Result<(), ResponseError> {
        self.response.finish()
    }
}
