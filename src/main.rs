//! Socket.IO intercepting proxy.
//!
//! Sits between Socket.IO clients and a server, decodes Engine.IO and
//! Socket.IO traffic on both transports, and lets observers inspect, drop or
//! rewrite packets before they are forwarded.
//!
//! ```text
//!   Client ──▶ http::server ──▶ intercept ──▶ protocol (decode)
//!                                  │
//!                                  ▼
//!                               events (observers decide)
//!                                  │
//!   Client ◀── http::server ◀── forward (re-encode) ──▶ Upstream
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use socketio_proxy::config::{load_config, validate_config, ProxyConfig};
use socketio_proxy::events::{register_packet_logging, EventBus};
use socketio_proxy::lifecycle;
use socketio_proxy::observability::logging::init_tracing;

#[derive(Parser)]
#[command(name = "socketio-proxy")]
#[command(about = "Intercepting proxy for Socket.IO traffic", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override `upstream.address`.
    #[arg(short, long)]
    upstream: Option<String>,
}

fn load(cli: &Cli) -> Result<ProxyConfig, String> {
    let mut config = match &cli.config {
        Some(path) => load_config(path).map_err(|e| format!("{}: {e}", path.display()))?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    if let Some(upstream) = &cli.upstream {
        config.upstream.address = upstream.clone();
    }
    validate_config(&config).map_err(|errors| {
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration:\n{e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.observability.log_level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        path_prefix = %config.intercept.path_prefix,
        "socketio-proxy starting"
    );

    let mut bus = EventBus::default();
    if config.observability.log_packets {
        register_packet_logging(&mut bus);
    }

    match lifecycle::run(config, bus).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Proxy failed");
            ExitCode::FAILURE
        }
    }
}
