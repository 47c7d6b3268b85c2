//! Event payloads, one fixed shape per category.

use serde::Serialize;

use crate::protocol::{Direction, EnginePacket, Handshake, Message, SocketPacket};
use crate::session::SessionInfo;

/// Category of an event, used for metric labels and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Connection,
    Open,
    Engine,
    Socket,
    Message,
    Error,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Connection => "connection",
            EventKind::Open => "open",
            EventKind::Engine => "engine",
            EventKind::Socket => "socket",
            EventKind::Message => "message",
            EventKind::Error => "error",
        }
    }
}

/// A classified request was attributed to a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEvent {
    pub session: SessionInfo,
    pub from_server: bool,
}

/// The server's handshake made the sid known.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenEvent {
    pub sid: String,
    pub handshake: Handshake,
    pub session: SessionInfo,
    pub from_server: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineEvent {
    pub sid: Option<String>,
    pub direction: Direction,
    pub from_server: bool,
    pub packet: EnginePacket,
}

impl EngineEvent {
    pub fn new(sid: Option<String>, direction: Direction, packet: EnginePacket) -> Self {
        Self {
            sid,
            direction,
            from_server: direction.from_server(),
            packet,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketEvent {
    pub sid: Option<String>,
    pub direction: Direction,
    pub from_server: bool,
    pub packet: SocketPacket,
}

impl SocketEvent {
    pub fn new(sid: Option<String>, direction: Direction, packet: SocketPacket) -> Self {
        Self {
            sid,
            direction,
            from_server: direction.from_server(),
            packet,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub message: Message,
    /// Canonical endpoint URL of the session.
    pub url: String,
    pub from_server: bool,
}

impl MessageEvent {
    pub fn new(message: Message, url: impl Into<String>) -> Self {
        Self {
            from_server: message.from_server(),
            message,
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Traffic matched the protocol pattern but could not be classified.
    Classification,
    /// Malformed Engine.IO or Socket.IO framing.
    Decode,
    /// Upstream or client connection failure.
    Transport,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Classification => "classification",
            ErrorKind::Decode => "decode",
            ErrorKind::Transport => "transport",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub sid: Option<String>,
    pub direction: Option<Direction>,
    /// False when the direction is unknown.
    pub from_server: bool,
    pub message: String,
    /// Offending bytes, when there are any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Vec<u8>>,
}

impl ErrorEvent {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            sid: None,
            direction: None,
            from_server: false,
            message: message.into(),
            raw: None,
        }
    }

    pub fn with_sid(mut self, sid: Option<String>) -> Self {
        self.sid = sid;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self.from_server = direction.from_server();
        self
    }

    pub fn with_raw(mut self, raw: impl Into<Vec<u8>>) -> Self {
        self.raw = Some(raw.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EnginePacketType;
    use serde_json::json;

    #[test]
    fn payloads_carry_a_from_server_flag() {
        let engine = EngineEvent::new(
            Some("abc".into()),
            Direction::ServerToClient,
            EnginePacket::text(EnginePacketType::Ping, ""),
        );
        let value = serde_json::to_value(&engine).unwrap();
        assert_eq!(value["fromServer"], json!(true));
        assert_eq!(value["sid"], json!("abc"));

        let error = ErrorEvent::new(ErrorKind::Decode, "bad frame");
        assert_eq!(serde_json::to_value(&error).unwrap()["fromServer"], json!(false));
        let error = error.with_direction(Direction::ServerToClient);
        assert_eq!(serde_json::to_value(&error).unwrap()["fromServer"], json!(true));
    }
}
