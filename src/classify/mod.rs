//! Request classification subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (method, URL, headers)
//!     → matcher.rs (host allow-list, path prefix, EIO + transport parameters)
//!     → classifier.rs (canonical URL, version, transport, sid)
//!     → Return: ClassifiedRequest, or None for out-of-protocol traffic
//! ```
//!
//! # Design Decisions
//! - Matchers are compiled once from config, immutable at runtime
//! - No regex in hot path (prefix and parameter checks only)
//! - Non-matching traffic is never touched by the protocol pipeline

pub mod classifier;
pub mod matcher;

pub use classifier::{ClassifiedRequest, Classifier, ClassifyError};
pub use matcher::RequestHead;
