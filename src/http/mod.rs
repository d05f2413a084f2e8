//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, first head, CONNECT or hyper)
//!     → head.rs (httparse request head)
//!     → request.rs (IncomingRequest: request + client address + hijack)
//!     → proxy::Dispatcher
//!     → response.rs (proxy-generated error replies)
//! ```

pub mod head;
pub mod request;
pub mod response;
pub mod server;

pub use request::IncomingRequest;
pub use server::ProxyServer;
