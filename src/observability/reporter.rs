//! Event reporting for the proxy core.
//!
//! # Responsibilities
//! - Define the events the forwarder and tunnel relay emit
//! - Provide the `tracing` backed reporter used by the binary
//! - Fan events out to several reporters (logs + metrics)
//!
//! # Design Decisions
//! - The core only sees the `Reporter` trait, never a logging backend
//! - Events borrow from the request path; reporters copy what they keep

use std::sync::Arc;
use std::time::Duration;

use hyper::{Method, StatusCode, Uri};

use crate::error::ProxyError;
use crate::observability::metrics;

/// Direction of one half of a tunnel relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToTarget,
    TargetToClient,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ClientToTarget => "client_to_target",
            Direction::TargetToClient => "target_to_client",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something worth knowing about happened while proxying.
#[derive(Debug)]
pub enum ProxyEvent<'a> {
    /// A non-CONNECT request is about to be forwarded.
    RequestReceived {
        client: &'a str,
        method: &'a Method,
        uri: &'a Uri,
    },
    /// The origin round trip failed.
    ForwardFailed {
        method: &'a Method,
        uri: &'a Uri,
        error: &'a ProxyError,
    },
    /// The origin answered and the response is on its way to the client.
    ResponseForwarded {
        method: &'a Method,
        uri: &'a Uri,
        status: StatusCode,
        elapsed: Duration,
    },
    /// A buffered, non-markup response body.
    BodyCaptured { uri: &'a Uri, body: &'a [u8] },
    /// Buffering a response body failed before it was complete.
    BodyReadFailed { uri: &'a Uri, error: &'a ProxyError },
    /// A streamed response body failed part way to the client.
    BodyCopyFailed { uri: &'a Uri, error: &'a ProxyError },
    /// A response body outgrew the buffer limit.
    BodyOversize { uri: &'a Uri, limit: usize },
    /// A CONNECT request arrived.
    TunnelRequested { client: &'a str, target: &'a str },
    /// Raw control of the client connection could not be taken.
    HijackFailed { target: &'a str, error: &'a ProxyError },
    /// The tunnel target could not be reached.
    DialFailed { target: &'a str, error: &'a ProxyError },
    /// Both ends are connected and the success line was sent.
    TunnelEstablished { target: &'a str },
    /// One relay direction stopped; the session is being torn down.
    RelayFinished {
        target: &'a str,
        direction: Direction,
        bytes: u64,
        error: Option<&'a ProxyError>,
    },
}

/// Sink for proxy events.
pub trait Reporter: Send + Sync {
    fn report(&self, event: &ProxyEvent<'_>);
}

impl<R: Reporter + ?Sized> Reporter for Arc<R> {
    fn report(&self, event: &ProxyEvent<'_>) {
        (**self).report(event)
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &ProxyEvent<'_>) {
        match event {
            ProxyEvent::RequestReceived { client, method, uri } => {
                tracing::info!(client = %client, method = %method, uri = %uri, "[HTTP] forwarding");
            }
            ProxyEvent::ForwardFailed { method, uri, error } => {
                tracing::error!(method = %method, uri = %uri, error = %error, "[HTTP] forward error");
            }
            ProxyEvent::ResponseForwarded { method, uri, status, elapsed } => {
                tracing::debug!(
                    method = %method,
                    uri = %uri,
                    status = status.as_u16(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "[HTTP] response"
                );
            }
            ProxyEvent::BodyCaptured { uri, body } => {
                tracing::info!(
                    target: "forward_proxy::body",
                    uri = %uri,
                    len = body.len(),
                    "[BODY]\n{}",
                    String::from_utf8_lossy(body)
                );
            }
            ProxyEvent::BodyReadFailed { uri, error } => {
                tracing::error!(uri = %uri, error = %error, "[HTTP] read body error");
            }
            ProxyEvent::BodyCopyFailed { uri, error } => {
                tracing::error!(uri = %uri, error = %error, "[HTTP] copy body error");
            }
            ProxyEvent::BodyOversize { uri, limit } => {
                tracing::warn!(uri = %uri, limit = limit, "[HTTP] body exceeds buffer limit");
            }
            ProxyEvent::TunnelRequested { client, target } => {
                tracing::info!(client = %client, target_addr = %target, "[CONNECT] tunnel requested");
            }
            ProxyEvent::HijackFailed { target, error } => {
                tracing::error!(target_addr = %target, error = %error, "[CONNECT] hijack failed");
            }
            ProxyEvent::DialFailed { target, error } => {
                tracing::error!(target_addr = %target, error = %error, "[CONNECT] dial to target failed");
            }
            ProxyEvent::TunnelEstablished { target } => {
                tracing::debug!(target_addr = %target, "[CONNECT] tunnel established");
            }
            ProxyEvent::RelayFinished { target, direction, bytes, error } => match error {
                Some(error) => tracing::warn!(
                    target_addr = %target,
                    direction = %direction,
                    bytes = bytes,
                    error = %error,
                    "[CONNECT] relay failed"
                ),
                None => tracing::debug!(
                    target_addr = %target,
                    direction = %direction,
                    bytes = bytes,
                    "[CONNECT] relay finished"
                ),
            },
        }
    }
}

/// Feeds the Prometheus recorder.
#[derive(Debug, Clone, Default)]
pub struct MetricsReporter;

impl Reporter for MetricsReporter {
    fn report(&self, event: &ProxyEvent<'_>) {
        match event {
            ProxyEvent::ResponseForwarded { method, status, elapsed, .. } => {
                metrics::record_request(method.as_str(), status.as_u16(), *elapsed);
            }
            ProxyEvent::ForwardFailed { method, error, .. } => {
                metrics::record_request_failure(method.as_str(), error.status().as_u16());
            }
            ProxyEvent::HijackFailed { .. } => metrics::record_tunnel("hijack_failed"),
            ProxyEvent::DialFailed { .. } => metrics::record_tunnel("dial_failed"),
            ProxyEvent::TunnelEstablished { .. } => metrics::record_tunnel("established"),
            ProxyEvent::RelayFinished { direction, bytes, .. } => {
                metrics::record_relay_bytes(direction.as_str(), *bytes);
            }
            _ => {}
        }
    }
}

/// Forwards each event to every inner reporter in order.
#[derive(Default)]
pub struct FanoutReporter {
    inner: Vec<Box<dyn Reporter>>,
}

impl FanoutReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: impl Reporter + 'static) -> Self {
        self.inner.push(Box::new(reporter));
        self
    }
}

impl Reporter for FanoutReporter {
    fn report(&self, event: &ProxyEvent<'_>) {
        for reporter in &self.inner {
            reporter.report(event);
        }
    }
}
