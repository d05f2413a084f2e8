//! Explicit HTTP forward proxy.
//!
//! Plain HTTP requests are forwarded to their origin; CONNECT requests
//! become raw byte tunnels.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
