//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     ctrl-c → broadcast → accept loop stops → drain connections → exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close
//! - Draining is bounded: open tunnels do not hold the process forever

pub mod shutdown;

pub use shutdown::Shutdown;
