//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Bind server to listener
//! - Dispatch requests to the polling, websocket or passthrough path
//! - Observability (metrics, correlation IDs)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::request::{head_of, request_id, MakeRequestUuid, X_REQUEST_ID};
use super::response::from_upstream;
use super::upstream::UpstreamClient;
use super::{polling, websocket, ProxyError};
use crate::config::ProxyConfig;
use crate::events::EventBus;
use crate::intercept::Interceptor;
use crate::lifecycle::Shutdown;
use crate::net::ConnectionTracker;
use crate::observability::metrics;
use crate::protocol::Transport;
use crate::session::SessionRegistry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub interceptor: Arc<Interceptor>,
    pub upstream: UpstreamClient,
    pub connections: ConnectionTracker,
    pub shutdown: Shutdown,
    pub max_body_size: usize,
}

/// HTTP server for the intercepting proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    registry: SessionRegistry,
    connections: ConnectionTracker,
    shutdown: Shutdown,
}

impl HttpServer {
    /// Create a new HTTP server. Observers must be registered on `bus` beforehand.
    pub fn new(config: ProxyConfig, bus: EventBus, shutdown: Shutdown) -> Self {
        let registry = SessionRegistry::new();
        let connections = ConnectionTracker::new();
        let interceptor = Interceptor::new(&config.intercept, registry.clone(), Arc::new(bus));

        let state = AppState {
            interceptor: Arc::new(interceptor),
            upstream: UpstreamClient::new(&config.upstream, &config.timeouts),
            connections: connections.clone(),
            shutdown: shutdown.clone(),
            max_body_size: config.intercept.max_body_size,
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            registry,
            connections,
            shutdown,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.intercept.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID)),
            )
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server until the shutdown coordinator fires.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let shutdown = self.shutdown.clone();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Classifies the request, then intercepts it or forwards it untouched.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(request.headers());
    let method = request.method().to_string();

    let classified = state.interceptor.classify(&head_of(&request));
    let intercepted = classified.is_some();

    tracing::debug!(
        request_id = %request_id,
        client = %client,
        method = %method,
        path = %request.uri().path(),
        intercepted,
        "Proxying request"
    );

    let result = match classified {
        Some(c) if c.request.transport == Transport::Polling => polling::handle(&state, c, request).await,
        Some(c) if websocket::is_upgrade_request(&request) => websocket::handle(state.clone(), c, request).await,
        _ => passthrough(&state, request).await,
    };

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Proxy request failed");
            e.into_response()
        }
    };

    metrics::record_request(&method, response.status().as_u16(), intercepted, start_time);
    response
}

/// Forward a request outside the protocol without looking at it.
async fn passthrough(state: &AppState, request: Request<Body>) -> Result<Response, ProxyError> {
    tracing::debug!(
        method = %request.method(),
        uri = %request.uri(),
        "Out-of-protocol request forwarded untouched"
    );
    let (parts, body) = request.into_parts();
    let response = state
        .upstream
        .forward(state.upstream.default_target(), parts, body)
        .await?;
    Ok(from_upstream(response))
}
