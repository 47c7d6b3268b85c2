//! Admin API.
//!
//! Read-only view of live sessions and WebSocket relays, served on its own
//! listener and guarded by a bearer token.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::{get_sessions, get_status};
use crate::net::ConnectionTracker;
use crate::session::SessionRegistry;

/// State shared by the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub registry: SessionRegistry,
    pub connections: ConnectionTracker,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(registry: SessionRegistry, connections: ConnectionTracker, api_key: &str) -> Self {
        Self {
            registry,
            connections,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/sessions", get(get_sessions))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
