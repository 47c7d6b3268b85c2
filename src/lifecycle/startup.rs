//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind listeners before any background work starts
//! - Initialize subsystems in dependency order
//! - Start background tasks (metrics exporter, session reaper, admin API)
//! - Run the proxy until shutdown, then drain WebSocket relays
//!
//! # Design Decisions
//! - Fail fast: any bind error is fatal
//! - Listeners start last (traffic only when ready)
//! - Relay drain is bounded; stragglers are abandoned

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;

use super::signals::spawn_signal_handler;
use super::Shutdown;
use crate::admin::{setup_admin_router, AdminState};
use crate::config::ProxyConfig;
use crate::events::EventBus;
use crate::http::HttpServer;
use crate::observability::metrics;
use crate::session::SessionReaper;

/// How long relays get to close after the server stops accepting.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {field}: {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("server error: {0}")]
    Server(#[source] std::io::Error),
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address).await.map_err(|source| StartupError::Bind {
        address: address.to_string(),
        source,
    })
}

/// Run the proxy with the given observers until a shutdown signal arrives.
pub async fn run(config: ProxyConfig, bus: EventBus) -> Result<(), StartupError> {
    let shutdown = Shutdown::new();

    let listener = bind(&config.listener.bind_address).await?;

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::InvalidAddress {
                field: "observability.metrics_address",
                value: config.observability.metrics_address.clone(),
            })?;
        metrics::init_metrics(addr);
    }

    let server = HttpServer::new(config.clone(), bus, shutdown.clone());
    let connections = server.connections().clone();

    if config.admin.enabled {
        let admin_listener = bind(&config.admin.bind_address).await?;
        let state = AdminState::new(server.registry().clone(), connections.clone(), &config.admin.api_key);
        let router = setup_admin_router(state);
        let admin_shutdown = shutdown.clone();
        tracing::info!(address = %config.admin.bind_address, "Admin API starting");
        tokio::spawn(async move {
            let served = axum::serve(admin_listener, router)
                .with_graceful_shutdown(async move { admin_shutdown.wait().await })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let reaper = SessionReaper::new(server.registry().clone(), config.sessions.clone());
    tokio::spawn(reaper.run(shutdown.subscribe()));

    spawn_signal_handler(shutdown.clone());

    server.run(listener).await.map_err(StartupError::Server)?;
    shutdown.trigger();

    if !connections.wait_for_drain(DRAIN_TIMEOUT).await {
        tracing::warn!(
            remaining = connections.active_count(),
            "Websocket relays still open after drain timeout"
        );
    }
    Ok(())
}
