//! Request dispatch by method.
//!
//! CONNECT goes to the tunnel relay, everything else to the forwarder.
//! The decision looks at the method alone.

use std::sync::Arc;

use axum::body::Body;
use hyper::{Method, Response};

use crate::config::ProxyConfig;
use crate::http::IncomingRequest;
use crate::observability::Reporter;
use crate::proxy::forward::HttpForwarder;
use crate::proxy::tunnel::TunnelRelay;

/// Where a request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Forward,
    Tunnel,
}

impl Route {
    /// Method names compare case-insensitively.
    pub fn for_method(method: &Method) -> Self {
        if method.as_str().eq_ignore_ascii_case(Method::CONNECT.as_str()) {
            Route::Tunnel
        } else {
            Route::Forward
        }
    }
}

/// What a handler did with a request.
#[derive(Debug)]
pub enum Dispatched {
    /// Send this response on the connection.
    Response(Response<Body>),
    /// The connection was taken over; nothing more may be written to it
    /// through the HTTP layer.
    Hijacked,
}

/// Routes each request to the forwarder or the tunnel relay.
#[derive(Clone)]
pub struct Dispatcher {
    forwarder: Arc<HttpForwarder>,
    tunnel: Arc<TunnelRelay>,
}

impl Dispatcher {
    pub fn new(config: &ProxyConfig, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            forwarder: Arc::new(HttpForwarder::new(config, reporter.clone())),
            tunnel: Arc::new(TunnelRelay::new(
                config.timeouts.tunnel_connect(),
                reporter,
            )),
        }
    }

    pub async fn dispatch(&self, req: IncomingRequest) -> Dispatched {
        match Route::for_method(req.method()) {
            Route::Tunnel => self.tunnel.relay(req).await,
            Route::Forward => Dispatched::Response(self.forwarder.forward(req).await),
        }
    }
}
