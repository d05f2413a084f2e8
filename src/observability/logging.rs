//! Structured logging.
//!
//! # Responsibilities
//! - Install the global `tracing` subscriber
//! - Default the filter from config, let `RUST_LOG` override it
//! - Honour the colour setting
//!
//! # Design Decisions
//! - Human-readable `fmt` output; the proxy logs to a terminal
//! - Response bodies log under their own target (`forward_proxy::body`)
//!   so they can be filtered separately

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(config: &ObservabilityConfig) -> String {
    format!("forward_proxy={}", config.log_level)
}

/// Install the global subscriber. Call once, early in `main`.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_ansi(config.ansi))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_scopes_level_to_crate() {
        let config = ObservabilityConfig {
            log_level: "warn".into(),
            ..ObservabilityConfig::default()
        };
        assert_eq!(default_filter(&config), "forward_proxy=warn");
    }
}
