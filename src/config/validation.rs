//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses (bind addresses parse, upstream is `host:port`)
//! - Validate value ranges (timeouts > 0, body limit > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::uri::Authority;

use super::schema::ProxyConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {:?}", config.listener.bind_address),
        ));
    }

    match config.upstream.address.parse::<Authority>() {
        Ok(authority) if authority.port_u16().is_some() => {}
        _ => errors.push(ValidationError::new(
            "upstream.address",
            format!("expected host:port, got {:?}", config.upstream.address),
        )),
    }

    if !config.intercept.path_prefix.starts_with('/') {
        errors.push(ValidationError::new("intercept.path_prefix", "must start with '/'"));
    }
    if config.intercept.max_body_size == 0 {
        errors.push(ValidationError::new("intercept.max_body_size", "must be greater than 0"));
    }
    for host in &config.intercept.hosts {
        if host.is_empty() || host.contains('/') {
            errors.push(ValidationError::new("intercept.hosts", format!("invalid host {host:?}")));
        }
    }

    if config.sessions.idle_timeout_secs > 0 && config.sessions.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "sessions.sweep_interval_secs",
            "must be greater than 0 when idle eviction is enabled",
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {:?}", config.observability.metrics_address),
        ));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("not a socket address: {:?}", config.admin.bind_address),
            ));
        }
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "nope".into();
        config.upstream.address = "no-port".into();
        config.intercept.path_prefix = "socket.io".into();
        config.timeouts.request_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "upstream.address",
                "intercept.path_prefix",
                "timeouts.request_secs"
            ]
        );
    }

    #[test]
    fn admin_checked_only_when_enabled() {
        let mut config = ProxyConfig::default();
        config.admin.api_key.clear();
        assert!(validate_config(&config).is_ok());
        config.admin.enabled = true;
        assert_eq!(validate_config(&config).unwrap_err()[0].field, "admin.api_key");
    }
}
