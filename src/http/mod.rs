//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, dispatch)
//!     → request.rs (request ID, request head for classification)
//!     → intercept::Interceptor::classify
//!         polling    → polling.rs (rewrite bodies in both directions)
//!         websocket  → websocket.rs (dial upstream, relay frames)
//!         other      → forwarded untouched
//!     → upstream.rs (hyper client to the upstream server)
//!     → response.rs (strip hop-by-hop headers)
//!     → Send to client
//! ```

pub mod polling;
pub mod request;
pub mod response;
pub mod server;
pub mod upstream;
pub mod websocket;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
pub use upstream::UpstreamClient;

/// Errors surfaced while proxying a single request.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("upstream websocket failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("client connection failed: {0}")]
    Client(#[source] axum::Error),

    #[error("failed to read body: {0}")]
    Body(#[source] axum::Error),

    #[error("failed to read upstream body: {0}")]
    UpstreamBody(#[source] axum::Error),

    #[error("invalid upstream target: {0}")]
    InvalidTarget(#[from] axum::http::uri::InvalidUri),

    #[error("upstream did not answer in time")]
    Timeout,
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Body(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errors_to_gateway_statuses() {
        assert_eq!(ProxyError::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        let invalid = "http://[bad".parse::<axum::http::Uri>().unwrap_err();
        let err = ProxyError::from(invalid);
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }
}
