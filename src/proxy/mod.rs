//! Forward proxy core.
//!
//! # Data Flow
//! ```text
//! IncomingRequest
//!     → dispatch.rs (CONNECT or not)
//!         → forward.rs (absolute URI, strip proxy headers, one round trip)
//!         → tunnel.rs (hijack, dial, relay bytes)
//! ```
//!
//! # Design Decisions
//! - No caching, no authentication, no retries
//! - Each forwarded request is an independent round trip
//! - Events go to a `Reporter`, never straight to a logger

pub mod classify;
pub mod dispatch;
pub mod forward;
pub mod headers;
pub mod hijack;
pub mod tunnel;

pub use dispatch::{Dispatched, Dispatcher, Route};
pub use forward::HttpForwarder;
pub use hijack::{Hijack, HijackError, RawConn, StreamHijack};
pub use tunnel::TunnelRelay;
