//! Session correlation subsystem.
//!
//! # Data Flow
//! ```text
//! ClassifiedRequest (sid?)
//!     → registry.rs (lookup_or_create: same sid → same Arc<Session>)
//!     → context.rs (merge request fields, per-direction decoders)
//!
//! Engine.IO open packet
//!     → registry.rs (register sid)
//!
//! close packet / websocket relay end / reaper.rs idle sweep
//!     → registry.rs (remove)
//! ```
//!
//! # Design Decisions
//! - DashMap for the registry, one std Mutex per session for decoder state
//! - Sessions never hold a map shard while locking their own state

pub mod context;
pub mod reaper;
pub mod registry;

pub use context::{Session, SessionInfo, SessionState};
pub use reaper::SessionReaper;
pub use registry::SessionRegistry;
