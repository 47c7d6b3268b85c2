//! Forwarding and re-encoding of Socket.IO packets.
//!
//! # Data Flow
//! ```text
//! DecodedPacket + Verdict
//!     → Drop      : nothing is sent
//!     → Verbatim  : original header text + original attachments
//!     → Rewrite   : Message → SocketPacket → header + attachments
//!     → PacketSink (Engine.IO message packets, in order)
//! ```
//!
//! # Design Decisions
//! - Untouched packets reuse the header text they arrived as, so the peer
//!   receives exactly the bytes the sender wrote
//! - Only packets whose decision was modified go through the encoder

use crate::events::MessageDecision;
use crate::protocol::{DecodedPacket, EnginePacket, Message, SocketPacket};

/// Destination for outgoing Engine.IO packets.
pub trait PacketSink {
    fn send(&mut self, packet: EnginePacket);
}

impl PacketSink for Vec<EnginePacket> {
    fn send(&mut self, packet: EnginePacket) {
        self.push(packet);
    }
}

/// What happens to one decoded Socket.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Drop,
    Verbatim,
    Rewrite(Message),
}

impl From<MessageDecision> for Verdict {
    fn from(decision: MessageDecision) -> Self {
        if decision.is_dropped() {
            Verdict::Drop
        } else if decision.is_modified() {
            Verdict::Rewrite(decision.into_message())
        } else {
            Verdict::Verbatim
        }
    }
}

/// Hand a decoded packet to `sink` according to `verdict`. Returns the number
/// of Engine.IO packets sent.
pub fn forward(decoded: &DecodedPacket, verdict: Verdict, sink: &mut impl PacketSink) -> usize {
    match verdict {
        Verdict::Drop => 0,
        Verdict::Verbatim => send_parts(decoded.header.clone(), &decoded.packet.attachments, sink),
        Verdict::Rewrite(message) => send_packet(&message.to_packet(), sink),
    }
}

/// Encode a Socket.IO packet as a header packet followed by its attachments.
pub fn send_packet(packet: &SocketPacket, sink: &mut impl PacketSink) -> usize {
    send_parts(packet.encode_header(), &packet.attachments, sink)
}

fn send_parts(header: String, attachments: &[Vec<u8>], sink: &mut impl PacketSink) -> usize {
    sink.send(EnginePacket::message(header));
    for attachment in attachments {
        sink.send(EnginePacket::binary(attachment.clone()));
    }
    1 + attachments.len()
}
