//! Metrics collection and exposition.
//!
//! # Metrics
//! - `sio_proxy_requests_total` (counter): HTTP requests by method, status, intercepted
//! - `sio_proxy_request_duration_seconds` (histogram): request latency
//! - `sio_proxy_engine_packets_total` (counter): Engine.IO packets by direction, type
//! - `sio_proxy_socket_packets_total` (counter): Socket.IO packets by direction, type
//! - `sio_proxy_dropped_total` (counter): packets dropped by observers, by direction, layer
//! - `sio_proxy_rewritten_total` (counter): messages re-encoded after a rewrite
//! - `sio_proxy_undecoded_total` (counter): message packets passed through a failed decoder
//! - `sio_proxy_errors_total` (counter): error events by kind
//! - `sio_proxy_sessions` (gauge): registered sessions
//! - `sio_proxy_ws_relays` (gauge): live WebSocket relays
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::events::ErrorKind;
use crate::protocol::{Direction, EnginePacketType, SocketPacketType};

pub const REQUESTS_TOTAL: &str = "sio_proxy_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "sio_proxy_request_duration_seconds";
pub const ENGINE_PACKETS_TOTAL: &str = "sio_proxy_engine_packets_total";
pub const SOCKET_PACKETS_TOTAL: &str = "sio_proxy_socket_packets_total";
pub const DROPPED_TOTAL: &str = "sio_proxy_dropped_total";
pub const REWRITTEN_TOTAL: &str = "sio_proxy_rewritten_total";
pub const UNDECODED_TOTAL: &str = "sio_proxy_undecoded_total";
pub const ERRORS_TOTAL: &str = "sio_proxy_errors_total";
pub const SESSIONS: &str = "sio_proxy_sessions";
pub const WS_RELAYS: &str = "sio_proxy_ws_relays";

/// Install the Prometheus recorder with its own scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, intercepted: bool, start: Instant) {
    let method = method.to_string();
    let intercepted = if intercepted { "true" } else { "false" };
    counter!(
        REQUESTS_TOTAL,
        "method" => method.clone(),
        "status" => status.to_string(),
        "intercepted" => intercepted
    )
    .increment(1);
    histogram!(REQUEST_DURATION_SECONDS, "method" => method, "intercepted" => intercepted)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_engine_packet(direction: Direction, packet_type: EnginePacketType) {
    counter!(ENGINE_PACKETS_TOTAL, "direction" => direction.as_str(), "type" => packet_type.as_str()).increment(1);
}

pub fn record_socket_packet(direction: Direction, packet_type: SocketPacketType) {
    counter!(SOCKET_PACKETS_TOTAL, "direction" => direction.as_str(), "type" => packet_type.as_str()).increment(1);
}

pub fn record_dropped(direction: Direction, layer: &'static str) {
    counter!(DROPPED_TOTAL, "direction" => direction.as_str(), "layer" => layer).increment(1);
}

pub fn record_rewritten(direction: Direction) {
    counter!(REWRITTEN_TOTAL, "direction" => direction.as_str()).increment(1);
}

pub fn record_undecoded(direction: Direction) {
    counter!(UNDECODED_TOTAL, "direction" => direction.as_str()).increment(1);
}

pub fn record_error(kind: ErrorKind) {
    counter!(ERRORS_TOTAL, "kind" => kind.as_str()).increment(1);
}

pub fn set_sessions(count: usize) {
    gauge!(SESSIONS).set(count as f64);
}

pub fn set_ws_relays(count: usize) {
    gauge!(WS_RELAYS).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_are_prefixed_snake_case() {
        for name in [
            REQUESTS_TOTAL,
            REQUEST_DURATION_SECONDS,
            ENGINE_PACKETS_TOTAL,
            SOCKET_PACKETS_TOTAL,
            DROPPED_TOTAL,
            REWRITTEN_TOTAL,
            UNDECODED_TOTAL,
            ERRORS_TOTAL,
            SESSIONS,
            WS_RELAYS,
        ] {
            assert!(name.starts_with("sio_proxy_"));
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{name}");
        }
    }

    #[test]
    fn recorded_values_are_rendered() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            record_engine_packet(Direction::ClientToServer, EnginePacketType::Message);
            record_dropped(Direction::ServerToClient, "message");
            set_sessions(3);
        });
        let output = handle.render();
        assert!(output.contains(ENGINE_PACKETS_TOTAL));
        assert!(output.contains(r#"layer="message""#));
        assert!(output.lines().any(|line| line.starts_with("sio_proxy_sessions 3")));
    }
}
