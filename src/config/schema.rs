//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files, and
//! every default matches the behaviour of the proxy run without a file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Response forwarding behaviour.
    pub forwarding: ForwardingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:7070").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7070".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to receive a request head, in seconds.
    /// Does not apply once a tunnel is established.
    pub handshake_secs: u64,

    /// Tunnel target dial timeout in seconds.
    pub tunnel_connect_secs: u64,

    /// Origin connect timeout for forwarded requests in seconds.
    pub upstream_connect_secs: u64,

    /// How long pooled origin connections may sit idle, in seconds.
    pub pool_idle_secs: u64,
}

impl TimeoutConfig {
    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }

    pub fn tunnel_connect(&self) -> Duration {
        Duration::from_secs(self.tunnel_connect_secs)
    }

    pub fn upstream_connect(&self) -> Duration {
        Duration::from_secs(self.upstream_connect_secs)
    }

    pub fn pool_idle(&self) -> Duration {
        Duration::from_secs(self.pool_idle_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handshake_secs: 10,
            tunnel_connect_secs: 10,
            upstream_connect_secs: 30,
            pool_idle_secs: 90,
        }
    }
}

/// What to do with a non-textual body that outgrows the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OversizePolicy {
    /// Send what was buffered, then stream the remainder.
    #[default]
    Stream,
    /// Replace the response with 502.
    Reject,
}

/// Response forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Largest non-textual body held in memory for inspection.
    pub max_buffered_body_bytes: usize,

    /// Behaviour once `max_buffered_body_bytes` is exceeded.
    pub oversize: OversizePolicy,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            max_buffered_body_bytes: 8 * 1024 * 1024, // 8MB
            oversize: OversizePolicy::Stream,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Colour log output.
    pub ansi: bool,

    /// Buffer non-textual bodies and log the ones that are not markup.
    pub log_bodies: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            ansi: true,
            log_bodies: true,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
