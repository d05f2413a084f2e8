//! Inbound request representation.
//!
//! # Responsibilities
//! - Pair the parsed request with the client address it came from
//! - Carry the connection's hijack capability, when it has one
//!
//! # Design Decisions
//! - Consumed exactly once: handlers take it by value
//! - Requests served by hyper never carry a hijack capability

use std::net::SocketAddr;

use axum::body::Body;
use hyper::{Method, Request};

use crate::proxy::hijack::Hijack;

/// One request received from a proxy client.
pub struct IncomingRequest {
    request: Request<Body>,
    client_addr: Option<SocketAddr>,
    hijack: Option<Box<dyn Hijack>>,
}

impl IncomingRequest {
    pub fn new(request: Request<Body>, client_addr: Option<SocketAddr>) -> Self {
        Self {
            request,
            client_addr,
            hijack: None,
        }
    }

    /// Attach the capability to take over the underlying connection.
    pub fn with_hijack(mut self, hijack: Box<dyn Hijack>) -> Self {
        self.hijack = Some(hijack);
        self
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Client address for log lines, `unknown` when there is none.
    pub fn client_label(&self) -> String {
        self.client_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn into_parts(self) -> (Request<Body>, Option<Box<dyn Hijack>>) {
        (self.request, self.hijack)
    }
}

impl std::fmt::Debug for IncomingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingRequest")
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .field("client_addr", &self.client_addr)
            .field("hijack", &self.hijack.is_some())
            .finish()
    }
}
