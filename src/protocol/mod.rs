//! Engine.IO / Socket.IO wire protocol.
//!
//! # Data Flow
//! ```text
//! HTTP body / WebSocket frame
//!     → payload.rs (split polling batches; EIO=3 and EIO=4 framings)
//!     → engine.rs (one EnginePacket per framing unit)
//!     → decoder.rs (stateful, per session and direction)
//!         → socket.rs (header parsing, binary placeholders)
//!     → message.rs (event/ack view handed to observers)
//! ```
//!
//! # Design Decisions
//! - Every decode has an exact inverse; untouched traffic re-encodes bit-for-bit
//! - Binary reassembly is an explicit state machine, one instance per direction
//! - Codec errors are values, never panics: bad framing only affects its session

pub mod decoder;
pub mod engine;
pub mod message;
pub mod payload;
pub mod socket;

use serde::Serialize;

pub use decoder::{DecodedPacket, SocketDecoder};
pub use engine::{EngineCodec, EnginePacket, EnginePacketType, Handshake, PacketData, WsFrame};
pub use message::Message;
pub use payload::{Payload, PayloadFormat};
pub use socket::{SocketPacket, SocketPacketType};

/// Which way a unit of traffic is travelling through the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

impl Direction {
    pub fn from_server(self) -> bool {
        matches!(self, Direction::ServerToClient)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::ClientToServer => "client_to_server",
            Direction::ServerToClient => "server_to_client",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine.IO protocol revision, from the `EIO` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProtocolVersion {
    /// `EIO=3`: length-prefixed polling payloads (Socket.IO v2 era).
    V3,
    /// `EIO=4`: record-separator polling payloads.
    V4,
}

impl ProtocolVersion {
    pub fn from_query(value: &str) -> Option<Self> {
        match value {
            "3" => Some(ProtocolVersion::V3),
            "4" => Some(ProtocolVersion::V4),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolVersion::V3 => "3",
            ProtocolVersion::V4 => "4",
        }
    }
}

/// Engine.IO transport kind, from the `transport` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Polling,
    WebSocket,
}

impl Transport {
    pub fn from_query(value: &str) -> Option<Self> {
        match value {
            "polling" => Some(Transport::Polling),
            "websocket" => Some(Transport::WebSocket),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Transport::Polling => "polling",
            Transport::WebSocket => "websocket",
        }
    }
}

/// Errors produced while decoding Engine.IO or Socket.IO framing.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("empty packet")]
    Empty,

    #[error("unknown engine.io packet type {0:?}")]
    UnknownEngineType(char),

    #[error("unknown socket.io packet type {0:?}")]
    UnknownSocketType(char),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed payload framing: {0}")]
    Framing(&'static str),

    #[error("malformed socket.io header: {0}")]
    Header(&'static str),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid {packet_type} payload: {reason}")]
    InvalidPayload {
        packet_type: &'static str,
        reason: &'static str,
    },

    #[error("binary attachment received while no binary packet was pending")]
    UnexpectedBinary,

    #[error("text packet received while {remaining} binary attachment(s) were pending")]
    UnexpectedText { remaining: usize },

    #[error("decoder is unusable after an earlier framing error")]
    DecoderFailed,
}
