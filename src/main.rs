//! Explicit HTTP forward proxy.
//!
//! ```text
//!   client ──HTTP──▶ ┌──────────────┐ ──HTTP──▶ origin
//!                    │ forward-proxy│
//!   client ─CONNECT─▶└──────────────┘ ══TCP═══▶ target
//! ```
//!
//! Plain requests are forwarded with proxy headers stripped; CONNECT
//! requests are answered with `200 Connection Established` and relayed as
//! raw bytes.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use forward_proxy::config::{load_config, validation::validate_config, ConfigError, ProxyConfig};
use forward_proxy::net::Listener;
use forward_proxy::observability::{build_reporter, logging, metrics};
use forward_proxy::{ProxyServer, Shutdown};

/// Upper bound on waiting for open connections after shutdown.
const DRAIN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "forward-proxy")]
#[command(about = "Explicit HTTP forward proxy with CONNECT tunneling", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(short, long)]
    listen: Option<String>,

    /// Do not buffer or log response bodies
    #[arg(short, long)]
    quiet: bool,

    /// Disable ANSI colours in log output
    #[arg(long)]
    no_color: bool,
}

impl Args {
    fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ProxyConfig::default(),
        };

        if let Some(listen) = self.listen {
            config.listener.bind_address = listen;
        }
        if self.quiet {
            config.observability.log_bodies = false;
        }
        if self.no_color {
            config.observability.ansi = false;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Args::parse().into_config()?;

    logging::init_logging(&config.observability);
    tracing::info!("forward-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        log_bodies = config.observability.log_bodies,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        // Checked by validation.
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let listener = Listener::bind(&config.listener).await?;
    let server = ProxyServer::new(&config, build_reporter(&config.observability));
    let tracker = server.tracker();

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();
    server.run(listener, shutdown.subscribe()).await?;

    let remaining = tracker.drain(DRAIN_GRACE).await;
    if remaining > 0 {
        tracing::warn!(open_connections = remaining, "Drain deadline passed, exiting");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
