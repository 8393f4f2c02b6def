//! Canned responses written by the dispatch core.
//!
//! # Responsibilities
//! - 404 / 500 / 503 / 400 bodies
//! - Static file responses with a guessed content type
//!
//! # Design Decisions
//! - Error responses discard whatever the handler already buffered
//! - Internal error bodies never echo the failure text to the client

use axum::http::StatusCode;
use std::path::Path;

use crate::http::context::{RequestContext, ResponseError};
use crate::http::params::ArgumentError;

fn plain(ctx: &mut RequestContext, status: StatusCode, text: &str) -> Result<(), ResponseError> {
    let response = ctx.response_mut();
    response.set_status(status)?;
    response.clear_body()?;
    response.send_text(text)
}

pub fn not_found(ctx: &mut RequestContext) -> Result<(), ResponseError> {
    plain(ctx, StatusCode::NOT_FOUND, "Not Found")
}

pub fn internal_server_error(ctx: &mut RequestContext) -> Result<(), ResponseError> {
    plain(ctx, StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

pub fn service_unavailable(ctx: &mut RequestContext) -> Result<(), ResponseError> {
    plain(ctx, StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
}

/// Map a parameter error to a 400 naming the parameter.
pub fn bad_request(ctx: &mut RequestContext, error: &ArgumentError) -> Result<(), ResponseError> {
    plain(ctx, StatusCode::BAD_REQUEST, &error.to_string())
}

/// Send a file's bytes as the response body.
pub fn send_file(ctx: &mut RequestContext, path: &Path) -> std::io::Result<()> {
    let content = std::fs::read(path)?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    ctx.response_mut()
        .send_bytes(mime.essence_str(), content)
        .map_err(std::io::Error::other)
}
