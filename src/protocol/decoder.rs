//! Stateful Socket.IO decoder.
//!
//! # States
//! ```text
//! AwaitingHeader ──(binary header, N > 0)──▶ AwaitingAttachments(N)
//!       ▲                                          │
//!       └──────────(Nth attachment)────────────────┘
//!
//! any state ──(framing error)──▶ Failed (terminal)
//! ```
//!
//! One instance per session and direction; emission order equals arrival order.

use super::engine::PacketData;
use super::socket::{parse_header, SocketPacket};
use super::CodecError;

/// A completed packet together with the header text it arrived as.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    pub packet: SocketPacket,
    pub header: String,
}

#[derive(Debug, Default)]
enum DecoderState {
    #[default]
    AwaitingHeader,
    AwaitingAttachments {
        packet: SocketPacket,
        header: String,
        expected: usize,
    },
    Failed,
}

#[derive(Debug, Default)]
pub struct SocketDecoder {
    state: DecoderState,
    /// Parts of an incomplete binary packet abandoned by a decode error.
    withheld: Vec<PacketData>,
}

impl SocketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the data of one Engine.IO message packet.
    ///
    /// Returns `Ok(None)` while a binary packet is still missing attachments.
    /// Any error leaves the decoder permanently failed; parts buffered for the
    /// unfinished packet are then available from [`SocketDecoder::take_withheld`].
    pub fn add(&mut self, data: &PacketData) -> Result<Option<DecodedPacket>, CodecError> {
        let result = self.step(data);
        if result.is_err() {
            self.state = DecoderState::Failed;
        }
        result
    }

    fn step(&mut self, data: &PacketData) -> Result<Option<DecodedPacket>, CodecError> {
        match (std::mem::take(&mut self.state), data) {
            (DecoderState::Failed, _) => Err(CodecError::DecoderFailed),
            (DecoderState::AwaitingHeader, PacketData::Binary(_)) => Err(CodecError::UnexpectedBinary),
            (DecoderState::AwaitingHeader, PacketData::Text(text)) => {
                let header = parse_header(text)?;
                if header.packet.packet_type.is_binary() && header.attachments > 0 {
                    self.state = DecoderState::AwaitingAttachments {
                        packet: header.packet,
                        header: text.clone(),
                        expected: header.attachments,
                    };
                    return Ok(None);
                }
                Ok(Some(DecodedPacket {
                    packet: header.packet,
                    header: text.clone(),
                }))
            }
            (DecoderState::AwaitingAttachments { packet, header, expected }, PacketData::Text(_)) => {
                let remaining = expected - packet.attachments.len();
                self.withheld = std::iter::once(PacketData::Text(header))
                    .chain(packet.attachments.into_iter().map(PacketData::Binary))
                    .collect();
                Err(CodecError::UnexpectedText { remaining })
            }
            (
                DecoderState::AwaitingAttachments {
                    mut packet,
                    header,
                    expected,
                },
                PacketData::Binary(bytes),
            ) => {
                packet.attachments.push(bytes.clone());
                if packet.attachments.len() == expected {
                    return Ok(Some(DecodedPacket { packet, header }));
                }
                self.state = DecoderState::AwaitingAttachments {
                    packet,
                    header,
                    expected,
                };
                Ok(None)
            }
        }
    }

    /// `(received, expected)` while reassembling a binary packet.
    pub fn pending_attachments(&self) -> Option<(usize, usize)> {
        match &self.state {
            DecoderState::AwaitingAttachments { packet, expected, .. } => {
                Some((packet.attachments.len(), *expected))
            }
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, DecoderState::Failed)
    }

    /// Header and attachments of the packet that was being reassembled when
    /// decoding failed, in arrival order. Empty after the first call.
    pub fn take_withheld(&mut self) -> Vec<PacketData> {
        std::mem::take(&mut self.withheld)
    }
}
