//! Event dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! intercept pipeline
//!     → types.rs (immutable event snapshot)
//!     → bus.rs (observers in registration order)
//!     → decision.rs (route / drop / rewrite, read back once by the caller)
//! ```
//!
//! # Design Decisions
//! - One typed topic per category instead of a stringly-keyed emitter
//! - Observers get `&Event` plus `&mut Decision`; neither outlives the call
//! - Dispatch is synchronous; observers must not block

pub mod bus;
pub mod decision;
pub mod logging;
pub mod types;

pub use bus::EventBus;
pub use decision::{MessageDecision, PacketDecision, RouteDecision};
pub use logging::register_packet_logging;
pub use types::{
    ConnectionEvent, EngineEvent, ErrorEvent, ErrorKind, EventKind, MessageEvent, OpenEvent, SocketEvent,
};
