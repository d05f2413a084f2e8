//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! forwarder / tunnel relay
//!     → reporter.rs (ProxyEvent)
//!         → TracingReporter → logging.rs subscriber
//!         → MetricsReporter → metrics.rs (Prometheus)
//! ```
//!
//! # Design Decisions
//! - The proxy core reports events; it never picks a log backend
//! - Metrics are opt-in and cost nothing until a recorder is installed

pub mod logging;
pub mod metrics;
pub mod reporter;

use std::sync::Arc;

use crate::config::ObservabilityConfig;

pub use reporter::{Direction, FanoutReporter, MetricsReporter, ProxyEvent, Reporter, TracingReporter};

/// Reporter for the binary: logs always, metrics when enabled.
pub fn build_reporter(config: &ObservabilityConfig) -> Arc<dyn Reporter> {
    if config.metrics_enabled {
        Arc::new(FanoutReporter::new().with(TracingReporter).with(MetricsReporter))
    } else {
        Arc::new(TracingReporter)
    }
}
