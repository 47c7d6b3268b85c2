//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at process start
//! - Configure log level from `RUST_LOG` or the config file
//!
//! # Design Decisions
//! - `RUST_LOG` wins over `observability.log_level` when both are set
//! - The configured level applies to this crate; `tower_http` follows it so
//!   request spans show up alongside packet logs

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives for a configured level such as `"debug"`.
pub fn default_directives(level: &str) -> String {
    format!("socketio_proxy={level},tower_http={level}")
}

pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directives(level).into());
    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("tracing subscriber already installed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_target_crate_and_http_layer() {
        assert_eq!(default_directives("warn"), "socketio_proxy=warn,tower_http=warn");
        assert!(EnvFilter::try_new(default_directives("debug")).is_ok());
    }
}
