//! Socket.IO packet header format.
//!
//! `<type>[<attachments>-][<nsp>,][<ack id>][<json>]`
//!
//! Binary packets carry `{"_placeholder":true,"num":N}` objects in place of
//! each attachment; the attachments follow as separate Engine.IO messages.

use serde::Serialize;
use serde_json::{Map, Value};

use super::CodecError;

pub const DEFAULT_NAMESPACE: &str = "/";
const PLACEHOLDER_KEY: &str = "_placeholder";
const PLACEHOLDER_NUM: &str = "num";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SocketPacketType {
    Connect = 0,
    Disconnect = 1,
    Event = 2,
    Ack = 3,
    Error = 4,
    BinaryEvent = 5,
    BinaryAck = 6,
}

impl SocketPacketType {
    pub fn from_char(c: char) -> Result<Self, CodecError> {
        match c {
            '0' => Ok(SocketPacketType::Connect),
            '1' => Ok(SocketPacketType::Disconnect),
            '2' => Ok(SocketPacketType::Event),
            '3' => Ok(SocketPacketType::Ack),
            '4' => Ok(SocketPacketType::Error),
            '5' => Ok(SocketPacketType::BinaryEvent),
            '6' => Ok(SocketPacketType::BinaryAck),
            other => Err(CodecError::UnknownSocketType(other)),
        }
    }

    pub fn as_char(self) -> char {
        char::from(b'0' + self as u8)
    }

    pub fn is_binary(self) -> bool {
        matches!(self, SocketPacketType::BinaryEvent | SocketPacketType::BinaryAck)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SocketPacketType::Connect => "CONNECT",
            SocketPacketType::Disconnect => "DISCONNECT",
            SocketPacketType::Event => "EVENT",
            SocketPacketType::Ack => "ACK",
            SocketPacketType::Error => "ERROR",
            SocketPacketType::BinaryEvent => "BINARY_EVENT",
            SocketPacketType::BinaryAck => "BINARY_ACK",
        }
    }
}

/// A fully reassembled Socket.IO packet.
///
/// For binary packets `data` still holds the placeholders; `attachments[n]`
/// is the payload for placeholder `n`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SocketPacket {
    pub packet_type: SocketPacketType,
    pub nsp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip)]
    pub attachments: Vec<Vec<u8>>,
}

impl SocketPacket {
    pub fn new(packet_type: SocketPacketType, nsp: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            packet_type,
            nsp: nsp.into(),
            id: None,
            data,
            attachments: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Vec<u8>>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Data elements as an ordered sequence (empty when the packet has none).
    pub fn elements(&self) -> &[Value] {
        match &self.data {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// Header text; the attachments are sent after it, in order.
    pub fn encode_header(&self) -> String {
        let mut out = String::new();
        out.push(self.packet_type.as_char());
        if self.packet_type.is_binary() {
            out.push_str(&self.attachments.len().to_string());
            out.push('-');
        }
        if self.nsp != DEFAULT_NAMESPACE {
            out.push_str(&self.nsp);
            out.push(',');
        }
        if let Some(id) = self.id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }
        out
    }
}

/// A parsed header and the number of attachments it announces.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub packet: SocketPacket,
    pub attachments: usize,
}

pub fn parse_header(s: &str) -> Result<Header, CodecError> {
    let mut chars = s.chars();
    let type_char = chars.next().ok_or(CodecError::Empty)?;
    let packet_type = SocketPacketType::from_char(type_char)?;
    let mut rest = chars.as_str();

    let mut attachments = 0;
    if packet_type.is_binary() {
        let dash = rest
            .find('-')
            .ok_or(CodecError::Header("missing attachment count"))?;
        attachments = rest[..dash]
            .parse()
            .map_err(|_| CodecError::Header("invalid attachment count"))?;
        rest = &rest[dash + 1..];
    }

    let mut nsp = DEFAULT_NAMESPACE.to_string();
    if rest.starts_with('/') {
        match rest.find(',') {
            Some(comma) => {
                nsp = rest[..comma].to_string();
                rest = &rest[comma + 1..];
            }
            None => {
                nsp = rest.to_string();
                rest = "";
            }
        }
    }

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let id = if digits > 0 {
        Some(
            rest[..digits]
                .parse()
                .map_err(|_| CodecError::Header("invalid ack id"))?,
        )
    } else {
        None
    };
    rest = &rest[digits..];

    let data = if rest.is_empty() {
        None
    } else {
        Some(serde_json::from_str::<Value>(rest)?)
    };

    validate_data(packet_type, data.as_ref())?;
    if packet_type.is_binary() {
        if let Some(data) = &data {
            let mut nums = Vec::new();
            collect_placeholders(data, &mut nums);
            if nums.iter().any(|&n| n >= attachments) {
                return Err(CodecError::InvalidPayload {
                    packet_type: packet_type.as_str(),
                    reason: "placeholder references a missing attachment",
                });
            }
        }
    }

    Ok(Header {
        packet: SocketPacket {
            packet_type,
            nsp,
            id,
            data,
            attachments: Vec::new(),
        },
        attachments,
    })
}

fn validate_data(packet_type: SocketPacketType, data: Option<&Value>) -> Result<(), CodecError> {
    let invalid = |reason| CodecError::InvalidPayload {
        packet_type: packet_type.as_str(),
        reason,
    };
    match packet_type {
        SocketPacketType::Connect => match data {
            None | Some(Value::Object(_)) => Ok(()),
            Some(_) => Err(invalid("expected an object")),
        },
        SocketPacketType::Disconnect => match data {
            None => Ok(()),
            Some(_) => Err(invalid("unexpected data")),
        },
        SocketPacketType::Event | SocketPacketType::BinaryEvent => match data {
            Some(Value::Array(items)) => match items.first() {
                Some(Value::String(_)) => Ok(()),
                Some(_) => Err(invalid("event name must be a string")),
                None => Err(invalid("event has no data elements")),
            },
            _ => Err(invalid("expected a non-empty array")),
        },
        SocketPacketType::Ack | SocketPacketType::BinaryAck => match data {
            Some(Value::Array(_)) => Ok(()),
            _ => Err(invalid("expected an array")),
        },
        SocketPacketType::Error => match data {
            None | Some(Value::String(_)) | Some(Value::Object(_)) => Ok(()),
            Some(_) => Err(invalid("expected a string or object")),
        },
    }
}

/// Placeholder index if `value` is a placeholder object.
pub fn placeholder_index(value: &Value) -> Option<usize> {
    let obj = value.as_object()?;
    if obj.get(PLACEHOLDER_KEY)?.as_bool()? {
        obj.get(PLACEHOLDER_NUM)?.as_u64().map(|n| n as usize)
    } else {
        None
    }
}

pub fn placeholder(num: usize) -> Value {
    let mut obj = Map::new();
    obj.insert(PLACEHOLDER_KEY.to_string(), Value::Bool(true));
    obj.insert(PLACEHOLDER_NUM.to_string(), Value::from(num));
    Value::Object(obj)
}

/// Placeholder indices in depth-first order of appearance.
pub fn collect_placeholders(value: &Value, out: &mut Vec<usize>) {
    if let Some(num) = placeholder_index(value) {
        out.push(num);
        return;
    }
    match value {
        Value::Array(items) => items.iter().for_each(|v| collect_placeholders(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_placeholders(v, out)),
        _ => {}
    }
}

/// Rewrite every placeholder `n` to `remap(n)`.
pub fn renumber_placeholders(value: &mut Value, remap: &mut impl FnMut(usize) -> usize) {
    if let Some(num) = placeholder_index(value) {
        *value = placeholder(remap(num));
        return;
    }
    match value {
        Value::Array(items) => items.iter_mut().for_each(|v| renumber_placeholders(v, remap)),
        Value::Object(map) => map.values_mut().for_each(|v| renumber_placeholders(v, remap)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_event_with_namespace_and_id() {
        let header = parse_header(r#"2/chat,12["say","hi"]"#).unwrap();
        let packet = header.packet;
        assert_eq!(packet.packet_type, SocketPacketType::Event);
        assert_eq!(packet.nsp, "/chat");
        assert_eq!(packet.id, Some(12));
        assert_eq!(packet.data, Some(json!(["say", "hi"])));
        assert_eq!(packet.encode_header(), r#"2/chat,12["say","hi"]"#);
    }

    #[test]
    fn parses_connect_variants() {
        let plain = parse_header("0").unwrap().packet;
        assert_eq!(plain.nsp, "/");
        assert_eq!(plain.data, None);

        let with_auth = parse_header(r#"0/admin,{"token":"t"}"#).unwrap().packet;
        assert_eq!(with_auth.nsp, "/admin");
        assert_eq!(with_auth.data, Some(json!({"token": "t"})));

        let trailing = parse_header("0/admin,").unwrap().packet;
        assert_eq!(trailing.nsp, "/admin");
        assert_eq!(trailing.data, None);

        let bare = parse_header("0/admin").unwrap().packet;
        assert_eq!(bare.nsp, "/admin");
    }

    #[test]
    fn parses_binary_header() {
        let header = parse_header(r#"52-["upload",{"_placeholder":true,"num":0},{"_placeholder":true,"num":1}]"#).unwrap();
        assert_eq!(header.attachments, 2);
        assert_eq!(header.packet.packet_type, SocketPacketType::BinaryEvent);
        let mut nums = Vec::new();
        collect_placeholders(header.packet.data.as_ref().unwrap(), &mut nums);
        assert_eq!(nums, vec![0, 1]);
    }

    #[test]
    fn rejects_invalid_payloads() {
        assert!(parse_header("2[]").is_err());
        assert!(parse_header("2").is_err());
        assert!(parse_header("2[1,2]").is_err());
        assert!(parse_header("3{}").is_err());
        assert!(parse_header("1[\"x\"]").is_err());
        assert!(parse_header("0[1]").is_err());
        assert!(parse_header("9").is_err());
        assert!(parse_header("5[\"x\"]").is_err());
        assert!(parse_header(r#"51-["x",{"_placeholder":true,"num":3}]"#).is_err());
        assert!(parse_header(r#"2["x""#).is_err());
    }

    #[test]
    fn ack_and_error_payloads() {
        let ack = parse_header("37[]").unwrap().packet;
        assert_eq!(ack.packet_type, SocketPacketType::Ack);
        assert_eq!(ack.id, Some(7));
        assert!(ack.elements().is_empty());

        let err = parse_header(r#"4{"message":"Not authorized"}"#).unwrap().packet;
        assert_eq!(err.packet_type, SocketPacketType::Error);
        assert_eq!(parse_header(r#"4"nope""#).unwrap().packet.data, Some(json!("nope")));
    }

    #[test]
    fn renumbers_nested_placeholders() {
        let mut value = json!(["e", {"file": {"_placeholder": true, "num": 4}}, [{"_placeholder": true, "num": 2}]]);
        renumber_placeholders(&mut value, &mut |n| n / 2);
        assert_eq!(value, json!(["e", {"file": {"_placeholder": true, "num": 2}}, [{"_placeholder": true, "num": 1}]]));
    }
}
