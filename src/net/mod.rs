//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! WebSocket upgrade accepted
//!     → upstream dialed
//!     → connection.rs (relay registered, gauge updated)
//!     → frames relayed until either side closes
//!     → guard dropped (relay removed)
//! ```
//!
//! # Design Decisions
//! - Each relay tracked for the admin API and shutdown drain
//! - Tracking is RAII: a panicking or cancelled relay still unregisters

pub mod connection;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker, RelaySummary};
