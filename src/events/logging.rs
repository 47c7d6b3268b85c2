//! Observers that log protocol traffic.
//!
//! Installed when `observability.log_packets` is set. They never touch the
//! decisions they are handed.

use super::bus::EventBus;

pub fn register_packet_logging(bus: &mut EventBus) {
    bus.on_connection(|event, _| {
        tracing::info!(
            sid = ?event.session.sid,
            transport = event.session.transport.as_str(),
            method = %event.session.method,
            url = %event.session.url,
            raw_url = %event.session.raw_url,
            "Socket.IO connection"
        );
    })
    .on_open(|event, _| {
        tracing::info!(
            sid = %event.sid,
            upgrades = ?event.handshake.upgrades,
            ping_interval = ?event.handshake.ping_interval,
            url = %event.session.url,
            "Engine.IO session opened"
        );
    })
    .on_engine(|event, _| {
        tracing::debug!(
            sid = ?event.sid,
            direction = %event.direction,
            packet_type = event.packet.packet_type.as_str(),
            len = event.packet.data.len(),
            "Engine.IO packet"
        );
    })
    .on_socket(|event, _| {
        tracing::debug!(
            sid = ?event.sid,
            direction = %event.direction,
            packet_type = event.packet.packet_type.as_str(),
            nsp = %event.packet.nsp,
            header = %event.packet.encode_header(),
            "Socket.IO packet"
        );
    })
    .on_message(|event, _| {
        let message = &event.message;
        tracing::info!(
            sid = ?message.sid,
            direction = %message.direction,
            nsp = %message.nsp,
            event = message.event.as_deref().unwrap_or("<ack>"),
            ack_id = ?message.ack_id,
            args = %serde_json::Value::Array(message.args.clone()),
            attachments = message.attachments.len(),
            "Socket.IO message"
        );
    })
    .on_error(|event| {
        tracing::warn!(
            kind = event.kind.as_str(),
            sid = ?event.sid,
            direction = ?event.direction,
            raw_len = event.raw.as_ref().map_or(0, Vec::len),
            "{}",
            event.message
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn registers_one_observer_per_category() {
        let mut bus = EventBus::new();
        register_packet_logging(&mut bus);
        for kind in [
            EventKind::Connection,
            EventKind::Open,
            EventKind::Engine,
            EventKind::Socket,
            EventKind::Message,
            EventKind::Error,
        ] {
            assert_eq!(bus.observer_count(kind), 1, "{}", kind.as_str());
        }
    }
}
