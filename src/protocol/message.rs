//! Event/ack view of a Socket.IO packet.

use serde::Serialize;
use serde_json::Value;

use super::socket::{
    collect_placeholders, placeholder, placeholder_index, renumber_placeholders, SocketPacket,
    SocketPacketType,
};
use super::Direction;

/// The unit observers reason about. `event` is `None` for acknowledgements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub nsp: String,
    pub event: Option<String>,
    pub args: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<u64>,
    pub direction: Direction,
    pub sid: Option<String>,
    #[serde(skip)]
    pub attachments: Vec<Vec<u8>>,
}

impl Message {
    /// Message view of an event or ack packet; `None` for every other type.
    pub fn from_packet(packet: &SocketPacket, direction: Direction, sid: Option<String>) -> Option<Self> {
        let (event, args) = match packet.packet_type {
            SocketPacketType::Event | SocketPacketType::BinaryEvent => {
                let (name, args) = packet.elements().split_first()?;
                (Some(name.as_str()?.to_string()), args.to_vec())
            }
            SocketPacketType::Ack | SocketPacketType::BinaryAck => (None, packet.elements().to_vec()),
            _ => return None,
        };
        Some(Self {
            nsp: packet.nsp.clone(),
            event,
            args,
            ack_id: packet.id,
            direction,
            sid,
            attachments: packet.attachments.clone(),
        })
    }

    pub fn from_server(&self) -> bool {
        self.direction.from_server()
    }

    pub fn is_ack(&self) -> bool {
        self.event.is_none()
    }

    /// Bytes behind a placeholder argument.
    pub fn attachment(&self, value: &Value) -> Option<&[u8]> {
        placeholder_index(value).and_then(|n| self.attachments.get(n)).map(Vec::as_slice)
    }

    /// Append a binary attachment and return the placeholder to put in `args`.
    pub fn push_attachment(&mut self, bytes: Vec<u8>) -> Value {
        self.attachments.push(bytes);
        placeholder(self.attachments.len() - 1)
    }

    /// Re-assemble a packet. Placeholders are renumbered in order of
    /// appearance and attachments no argument references are left out.
    pub fn to_packet(&self) -> SocketPacket {
        let mut elements = Vec::with_capacity(self.args.len() + 1);
        if let Some(event) = &self.event {
            elements.push(Value::String(event.clone()));
        }
        elements.extend(self.args.iter().cloned());
        let mut data = Value::Array(elements);

        let mut referenced = Vec::new();
        collect_placeholders(&data, &mut referenced);
        let mut order: Vec<usize> = Vec::new();
        for num in referenced {
            if num < self.attachments.len() && !order.contains(&num) {
                order.push(num);
            }
        }
        renumber_placeholders(&mut data, &mut |num| {
            order.iter().position(|&n| n == num).unwrap_or(num)
        });
        let attachments: Vec<Vec<u8>> = order.iter().map(|&n| self.attachments[n].clone()).collect();

        let packet_type = match (self.event.is_some(), attachments.is_empty()) {
            (true, true) => SocketPacketType::Event,
            (true, false) => SocketPacketType::BinaryEvent,
            (false, true) => SocketPacketType::Ack,
            (false, false) => SocketPacketType::BinaryAck,
        };
        SocketPacket {
            packet_type,
            nsp: self.nsp.clone(),
            id: self.ack_id,
            data: Some(data),
            attachments,
        }
    }
}
