//! Engine.IO packet codec.
//!
//! A packet is a type digit followed by its data. Binary message data is
//! carried as raw WebSocket binary frames, or base64 with a `b` marker inside
//! text polling payloads.

use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::{CodecError, ProtocolVersion};

/// Engine.IO packet types, numbered as on the wire.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnginePacketType {
    Open = 0,
    Close = 1,
    Ping = 2,
    Pong = 3,
    Message = 4,
    Upgrade = 5,
    Noop = 6,
}

impl EnginePacketType {
    /// Packet type from its numeric value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EnginePacketType::Open),
            1 => Some(EnginePacketType::Close),
            2 => Some(EnginePacketType::Ping),
            3 => Some(EnginePacketType::Pong),
            4 => Some(EnginePacketType::Message),
            5 => Some(EnginePacketType::Upgrade),
            6 => Some(EnginePacketType::Noop),
            _ => None,
        }
    }

    /// Packet type from its ASCII digit.
    pub fn from_char(c: char) -> Result<Self, CodecError> {
        c.to_digit(10)
            .and_then(|d| Self::from_u8(d as u8))
            .ok_or(CodecError::UnknownEngineType(c))
    }

    pub fn as_char(self) -> char {
        char::from(b'0' + self as u8)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EnginePacketType::Open => "open",
            EnginePacketType::Close => "close",
            EnginePacketType::Ping => "ping",
            EnginePacketType::Pong => "pong",
            EnginePacketType::Message => "message",
            EnginePacketType::Upgrade => "upgrade",
            EnginePacketType::Noop => "noop",
        }
    }
}

/// Packet data: text for everything except binary message payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PacketData {
    Text(String),
    Binary(Vec<u8>),
}

impl PacketData {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PacketData::Text(s) => Some(s),
            PacketData::Binary(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PacketData::Text(s) => s.len(),
            PacketData::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes, for error reports.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PacketData::Text(s) => s.as_bytes().to_vec(),
            PacketData::Binary(b) => b.clone(),
        }
    }
}

/// One Engine.IO framing unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnginePacket {
    pub packet_type: EnginePacketType,
    pub data: PacketData,
}

impl EnginePacket {
    pub fn new(packet_type: EnginePacketType, data: PacketData) -> Self {
        Self { packet_type, data }
    }

    pub fn text(packet_type: EnginePacketType, data: impl Into<String>) -> Self {
        Self::new(packet_type, PacketData::Text(data.into()))
    }

    /// A message packet carrying a Socket.IO header.
    pub fn message(data: impl Into<String>) -> Self {
        Self::text(EnginePacketType::Message, data)
    }

    /// A message packet carrying a binary attachment.
    pub fn binary(data: Vec<u8>) -> Self {
        Self::new(EnginePacketType::Message, PacketData::Binary(data))
    }

    pub fn noop() -> Self {
        Self::text(EnginePacketType::Noop, "")
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.data, PacketData::Binary(_))
    }
}

/// A WebSocket data frame as seen by the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Payload of the `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl Handshake {
    pub fn parse(packet: &EnginePacket) -> Result<Self, CodecError> {
        let text = packet.data.as_text().ok_or(CodecError::InvalidPayload {
            packet_type: "open",
            reason: "handshake must be text",
        })?;
        Ok(serde_json::from_str(text)?)
    }
}

/// Version-aware encoder/decoder for single packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCodec {
    version: ProtocolVersion,
}

impl EngineCodec {
    pub fn new(version: ProtocolVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Decode a packet as it appears inside a text polling payload, where a
    /// leading `b` marks base64 binary data.
    pub fn decode_str(&self, s: &str) -> Result<EnginePacket, CodecError> {
        match s.strip_prefix('b') {
            Some(rest) => self.decode_base64(rest),
            None => decode_typed(s),
        }
    }

    /// Inverse of [`EngineCodec::decode_str`].
    pub fn encode_str(&self, packet: &EnginePacket) -> String {
        match &packet.data {
            PacketData::Text(text) => {
                let mut out = String::with_capacity(text.len() + 1);
                out.push(packet.packet_type.as_char());
                out.push_str(text);
                out
            }
            PacketData::Binary(bytes) => {
                let encoded = BASE64_STANDARD.encode(bytes);
                match self.version {
                    ProtocolVersion::V4 => format!("b{encoded}"),
                    ProtocolVersion::V3 => format!("b{}{encoded}", packet.packet_type.as_char()),
                }
            }
        }
    }

    /// Decode a single WebSocket frame.
    pub fn decode_frame(&self, frame: &WsFrame) -> Result<EnginePacket, CodecError> {
        match frame {
            WsFrame::Text(text) => decode_typed(text),
            WsFrame::Binary(bytes) => self.decode_binary(bytes),
        }
    }

    /// Inverse of [`EngineCodec::decode_frame`].
    pub fn encode_frame(&self, packet: &EnginePacket) -> WsFrame {
        match &packet.data {
            PacketData::Text(_) => WsFrame::Text(self.encode_str(packet)),
            PacketData::Binary(_) => WsFrame::Binary(self.encode_binary(packet)),
        }
    }

    /// Decode a raw binary packet: the bytes are the message data in EIO=4,
    /// a type byte followed by the data in EIO=3.
    pub fn decode_binary(&self, bytes: &[u8]) -> Result<EnginePacket, CodecError> {
        match self.version {
            ProtocolVersion::V4 => Ok(EnginePacket::binary(bytes.to_vec())),
            ProtocolVersion::V3 => {
                let (&type_byte, data) = bytes.split_first().ok_or(CodecError::Empty)?;
                let packet_type = EnginePacketType::from_u8(type_byte)
                    .ok_or(CodecError::UnknownEngineType(char::from(type_byte)))?;
                Ok(EnginePacket::new(packet_type, PacketData::Binary(data.to_vec())))
            }
        }
    }

    /// Inverse of [`EngineCodec::decode_binary`]. Text packets are written as
    /// their UTF-8 encoding.
    pub fn encode_binary(&self, packet: &EnginePacket) -> Vec<u8> {
        match (&packet.data, self.version) {
            (PacketData::Binary(bytes), ProtocolVersion::V4) => bytes.clone(),
            (PacketData::Binary(bytes), ProtocolVersion::V3) => {
                let mut out = Vec::with_capacity(bytes.len() + 1);
                out.push(packet.packet_type as u8);
                out.extend_from_slice(bytes);
                out
            }
            (PacketData::Text(_), _) => self.encode_str(packet).into_bytes(),
        }
    }

    fn decode_base64(&self, rest: &str) -> Result<EnginePacket, CodecError> {
        match self.version {
            ProtocolVersion::V4 => Ok(EnginePacket::binary(BASE64_STANDARD.decode(rest)?)),
            ProtocolVersion::V3 => {
                let mut chars = rest.chars();
                let type_char = chars.next().ok_or(CodecError::Empty)?;
                let packet_type = EnginePacketType::from_char(type_char)?;
                let data = BASE64_STANDARD.decode(chars.as_str())?;
                Ok(EnginePacket::new(packet_type, PacketData::Binary(data)))
            }
        }
    }
}

fn decode_typed(s: &str) -> Result<EnginePacket, CodecError> {
    let mut chars = s.chars();
    let type_char = chars.next().ok_or(CodecError::Empty)?;
    let packet_type = EnginePacketType::from_char(type_char)?;
    Ok(EnginePacket::text(packet_type, chars.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const V4: EngineCodec = EngineCodec { version: ProtocolVersion::V4 };
    const V3: EngineCodec = EngineCodec { version: ProtocolVersion::V3 };

    #[test]
    fn decodes_each_packet_type() {
        for (wire, expected) in [
            ("0{\"sid\":\"x\"}", EnginePacketType::Open),
            ("1", EnginePacketType::Close),
            ("2probe", EnginePacketType::Ping),
            ("3probe", EnginePacketType::Pong),
            ("42[\"a\"]", EnginePacketType::Message),
            ("5", EnginePacketType::Upgrade),
            ("6", EnginePacketType::Noop),
        ] {
            let packet = V4.decode_str(wire).unwrap();
            assert_eq!(packet.packet_type, expected);
            assert_eq!(V4.encode_str(&packet), wire);
        }
    }

    #[test]
    fn rejects_unknown_and_empty() {
        assert!(matches!(V4.decode_str("7"), Err(CodecError::UnknownEngineType('7'))));
        assert!(matches!(V4.decode_str(""), Err(CodecError::Empty)));
        assert!(matches!(V4.decode_str("é"), Err(CodecError::UnknownEngineType('é'))));
    }

    #[test]
    fn base64_binary_markers_differ_by_version() {
        let v4 = V4.decode_str("bAQID").unwrap();
        assert_eq!(v4, EnginePacket::binary(vec![1, 2, 3]));
        assert_eq!(V4.encode_str(&v4), "bAQID");

        let v3 = V3.decode_str("b4AQID").unwrap();
        assert_eq!(v3, EnginePacket::binary(vec![1, 2, 3]));
        assert_eq!(V3.encode_str(&v3), "b4AQID");
    }

    #[test]
    fn websocket_binary_frames() {
        let frame = WsFrame::Binary(vec![9, 8]);
        let packet = V4.decode_frame(&frame).unwrap();
        assert_eq!(packet, EnginePacket::binary(vec![9, 8]));
        assert_eq!(V4.encode_frame(&packet), frame);

        let frame = WsFrame::Binary(vec![4, 9, 8]);
        let packet = V3.decode_frame(&frame).unwrap();
        assert_eq!(packet, EnginePacket::binary(vec![9, 8]));
        assert_eq!(V3.encode_frame(&packet), frame);
    }

    #[test]
    fn websocket_text_frame_never_treated_as_base64() {
        let frame = WsFrame::Text("4bonjour".into());
        let packet = V4.decode_frame(&frame).unwrap();
        assert_eq!(packet, EnginePacket::message("bonjour"));
        assert_eq!(V4.encode_frame(&packet), frame);
    }

    #[test]
    fn parses_handshake() {
        let packet = V4
            .decode_str(r#"0{"sid":"abc123","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#)
            .unwrap();
        let handshake = Handshake::parse(&packet).unwrap();
        assert_eq!(handshake.sid, "abc123");
        assert_eq!(handshake.upgrades, vec!["websocket".to_string()]);
        assert_eq!(handshake.ping_interval, Some(25000));

        let minimal = V4.decode_str(r#"0{"sid":"abc123"}"#).unwrap();
        assert_eq!(Handshake::parse(&minimal).unwrap().sid, "abc123");
        assert!(Handshake::parse(&EnginePacket::text(EnginePacketType::Open, "{}")).is_err());
    }
}
