//! Socket.IO intercepting proxy library.
//!
//! The protocol core (`classify`, `session`, `protocol`, `events`, `forward`,
//! `intercept`) is synchronous and transport-agnostic; `http` drives it from
//! axum handlers and WebSocket relays.

// Protocol core
pub mod classify;
pub mod events;
pub mod forward;
pub mod intercept;
pub mod protocol;
pub mod session;

// Transport
pub mod http;
pub mod net;

// Cross-cutting concerns
pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use events::EventBus;
pub use http::HttpServer;
pub use intercept::Interceptor;
pub use lifecycle::Shutdown;
