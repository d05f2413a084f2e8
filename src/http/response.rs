//! Responses generated by the proxy itself.
//!
//! Everything the origin sends is passed through by the forwarder; this
//! module only builds the plain-text error replies for failures that
//! happen before a tunnel exists.

use std::error::Error;

use axum::body::Body;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};

use crate::error::ProxyError;

/// Plain-text error reply carrying the error and its causes.
pub fn error_response(err: &ProxyError) -> Response<Body> {
    text_response(err.status(), describe(err))
}

/// Plain-text reply with a trailing newline.
pub fn text_response(status: StatusCode, message: String) -> Response<Body> {
    let mut response = Response::new(Body::from(message + "\n"));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

/// Render an error followed by each distinct cause, `: ` separated.
pub fn describe(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
