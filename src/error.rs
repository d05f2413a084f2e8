//! Error taxonomy for the proxy core.
//!
//! Every failure is terminal for the request or tunnel session it belongs
//! to. Nothing in the core retries.

use hyper::StatusCode;
use thiserror::Error;

use crate::proxy::hijack::HijackError;

/// Errors raised while dispatching a single proxied request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The serving connection offers no way to take raw control of it.
    #[error("Hijacking not supported")]
    HijackUnsupported,

    /// A hijack was attempted but the connection could not be taken over.
    #[error("Hijack failed: {0}")]
    HijackFailed(#[from] HijackError),

    /// The tunnel target could not be reached.
    #[error("dial to {target} failed: {source}")]
    DialFailed {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The origin was unreachable or the exchange with it failed.
    #[error("Error forwarding request: {0}")]
    ForwardRoundTripFailed(#[from] hyper_util::client::legacy::Error),

    /// A body stream or relay copy failed mid-flight.
    #[error("copy error: {0}")]
    Copy(#[source] std::io::Error),

    /// A buffered response body ran past the configured limit.
    #[error("Response body exceeds buffer limit of {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The request target cannot be turned into an origin address.
    #[error("invalid request target: {0}")]
    InvalidTarget(String),
}

impl ProxyError {
    /// Status code presented to the client for failures that happen before
    /// a tunnel is established.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::HijackUnsupported => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::HijackFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::DialFailed { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::ForwardRoundTripFailed(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Copy(_) => StatusCode::BAD_GATEWAY,
            ProxyError::BodyTooLarge { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
        }
    }
}
