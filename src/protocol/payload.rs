//! Polling payload framing.
//!
//! # Wire variants
//! - EIO=4: packets joined by the record separator `0x1e`
//! - EIO=3 text: `<len>:<packet>` repeated, `len` in UTF-16 code units
//! - EIO=3 binary: `<0|1><len digits as bytes>0xff<packet>` repeated
//!
//! The framing detected on decode is kept in [`Payload`] so that the batch is
//! written back exactly the way it arrived.

use super::engine::{EngineCodec, EnginePacket, PacketData};
use super::{CodecError, ProtocolVersion};

const RECORD_SEPARATOR: char = '\u{1e}';
const BINARY_LENGTH_END: u8 = 0xff;
/// Matches the upper bound the reference parser puts on length digits.
const MAX_LENGTH_DIGITS: usize = 310;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Delimited,
    LengthPrefixed,
    BinaryFramed,
}

/// A decoded polling body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub format: PayloadFormat,
    pub packets: Vec<EnginePacket>,
}

impl EngineCodec {
    /// Split a polling body into its packets.
    pub fn decode_payload(&self, body: &[u8]) -> Result<Payload, CodecError> {
        match self.version() {
            ProtocolVersion::V4 => {
                let text = std::str::from_utf8(body).map_err(|_| CodecError::InvalidUtf8)?;
                let packets = if text.is_empty() {
                    Vec::new()
                } else {
                    text.split(RECORD_SEPARATOR)
                        .map(|part| self.decode_str(part))
                        .collect::<Result<_, _>>()?
                };
                Ok(Payload { format: PayloadFormat::Delimited, packets })
            }
            ProtocolVersion::V3 => match body.first() {
                Some(0) | Some(1) => Ok(Payload {
                    format: PayloadFormat::BinaryFramed,
                    packets: self.decode_binary_framed(body)?,
                }),
                _ => {
                    let text = std::str::from_utf8(body).map_err(|_| CodecError::InvalidUtf8)?;
                    Ok(Payload {
                        format: PayloadFormat::LengthPrefixed,
                        packets: self.decode_length_prefixed(text)?,
                    })
                }
            },
        }
    }

    /// Write packets back into a polling body using `format`.
    pub fn encode_payload(&self, format: PayloadFormat, packets: &[EnginePacket]) -> Vec<u8> {
        match format {
            PayloadFormat::Delimited => {
                let parts: Vec<String> = packets.iter().map(|p| self.encode_str(p)).collect();
                parts.join("\u{1e}").into_bytes()
            }
            PayloadFormat::LengthPrefixed => {
                let mut out = String::new();
                for packet in packets {
                    let encoded = self.encode_str(packet);
                    out.push_str(&utf16_len(&encoded).to_string());
                    out.push(':');
                    out.push_str(&encoded);
                }
                out.into_bytes()
            }
            PayloadFormat::BinaryFramed => {
                let mut out = Vec::new();
                for packet in packets {
                    let (marker, encoded) = match packet.data {
                        PacketData::Text(_) => (0u8, self.encode_str(packet).into_bytes()),
                        PacketData::Binary(_) => (1u8, self.encode_binary(packet)),
                    };
                    out.push(marker);
                    out.extend(encoded.len().to_string().bytes().map(|d| d - b'0'));
                    out.push(BINARY_LENGTH_END);
                    out.extend_from_slice(&encoded);
                }
                out
            }
        }
    }

    fn decode_length_prefixed(&self, mut rest: &str) -> Result<Vec<EnginePacket>, CodecError> {
        let mut packets = Vec::new();
        while !rest.is_empty() {
            let colon = rest.find(':').ok_or(CodecError::Framing("missing length separator"))?;
            let digits = &rest[..colon];
            if !is_canonical_length(digits.as_bytes(), |d| d.is_ascii_digit(), b'0') {
                return Err(CodecError::Framing("invalid packet length"));
            }
            let len: usize = digits
                .parse()
                .map_err(|_| CodecError::Framing("invalid packet length"))?;
            let body = &rest[colon + 1..];

            let mut units = 0;
            let mut end = 0;
            for c in body.chars() {
                if units >= len {
                    break;
                }
                units += c.len_utf16();
                end += c.len_utf8();
            }
            if units != len {
                return Err(CodecError::Framing("packet length exceeds payload"));
            }
            packets.push(self.decode_str(&body[..end])?);
            rest = &body[end..];
        }
        Ok(packets)
    }

    fn decode_binary_framed(&self, mut rest: &[u8]) -> Result<Vec<EnginePacket>, CodecError> {
        let mut packets = Vec::new();
        while let Some((&marker, tail)) = rest.split_first() {
            let end = tail
                .iter()
                .position(|&b| b == BINARY_LENGTH_END)
                .ok_or(CodecError::Framing("missing binary length terminator"))?;
            let digits = &tail[..end];
            if digits.len() > MAX_LENGTH_DIGITS || !is_canonical_length(digits, |d| d <= 9, 0) {
                return Err(CodecError::Framing("invalid binary packet length"));
            }
            let len = digits
                .iter()
                .try_fold(0usize, |acc, &d| acc.checked_mul(10)?.checked_add(d as usize))
                .ok_or(CodecError::Framing("invalid binary packet length"))?;
            let body = &tail[end + 1..];
            if body.len() < len {
                return Err(CodecError::Framing("packet length exceeds payload"));
            }
            let (packet, remaining) = body.split_at(len);
            packets.push(match marker {
                0 => {
                    let text = std::str::from_utf8(packet).map_err(|_| CodecError::InvalidUtf8)?;
                    self.decode_str(text)?
                }
                1 => self.decode_binary(packet)?,
                _ => return Err(CodecError::Framing("invalid binary packet marker")),
            });
            rest = remaining;
        }
        Ok(packets)
    }
}

/// Non-empty, digits only, no leading zero. Anything else would not be
/// written back byte for byte.
fn is_canonical_length(digits: &[u8], is_digit: impl Fn(u8) -> bool, zero: u8) -> bool {
    match digits {
        [] => false,
        [first, _, ..] if *first == zero => false,
        _ => digits.iter().all(|&d| is_digit(d)),
    }
}

fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::engine::EnginePacketType;

    fn v4() -> EngineCodec {
        EngineCodec::new(ProtocolVersion::V4)
    }

    fn v3() -> EngineCodec {
        EngineCodec::new(ProtocolVersion::V3)
    }

    #[test]
    fn ping_and_message_batch_roundtrips() {
        let body = "2\u{1e}42[\"my-message\",\"hi\"]".as_bytes();
        let payload = v4().decode_payload(body).unwrap();
        assert_eq!(payload.packets.len(), 2);
        assert_eq!(payload.packets[0].packet_type, EnginePacketType::Ping);
        assert_eq!(payload.packets[1], EnginePacket::message("2[\"my-message\",\"hi\"]"));
        assert_eq!(v4().encode_payload(payload.format, &payload.packets), body);
    }

    #[test]
    fn v4_batch_with_base64_attachment() {
        let body = "451-[\"upload\",{\"_placeholder\":true,\"num\":0}]\u{1e}bAQID".as_bytes();
        let payload = v4().decode_payload(body).unwrap();
        assert_eq!(payload.packets[1], EnginePacket::binary(vec![1, 2, 3]));
        assert_eq!(v4().encode_payload(payload.format, &payload.packets), body);
    }

    #[test]
    fn empty_body_is_empty_batch() {
        let payload = v4().decode_payload(b"").unwrap();
        assert!(payload.packets.is_empty());
        assert!(v4().encode_payload(payload.format, &payload.packets).is_empty());
    }

    #[test]
    fn v3_length_prefixed_counts_utf16_units() {
        // "é" is one UTF-16 unit, "😀" is two.
        let body = String::from("2:40") + "5:42\"é\"" + "5:4\"😀\"";
        let payload = v3().decode_payload(body.as_bytes()).unwrap();
        assert_eq!(payload.format, PayloadFormat::LengthPrefixed);
        assert_eq!(payload.packets.len(), 3);
        assert_eq!(payload.packets[2], EnginePacket::message("\"😀\""));
        assert_eq!(v3().encode_payload(payload.format, &payload.packets), body.as_bytes());
    }

    #[test]
    fn v3_length_prefixed_rejects_short_payload() {
        assert!(v3().decode_payload(b"10:42").is_err());
        assert!(v3().decode_payload(b"x:42").is_err());
        assert!(v3().decode_payload(b"42").is_err());
    }

    #[test]
    fn v3_length_prefixes_must_be_canonical() {
        assert!(v3().decode_payload(b"02:40").is_err());
        assert!(v3().decode_payload(b"+2:40").is_err());
        assert!(v3().decode_payload(b":40").is_err());
        assert!(v3().decode_payload(&[0, 0, 2, 0xff, b'4', b'0']).is_err());

        let single_digit = v3().decode_payload(&[0, 1, 0xff, b'6']).unwrap();
        assert_eq!(v3().encode_payload(single_digit.format, &single_digit.packets), vec![0, 1, 0xff, b'6']);
    }

    #[test]
    fn v3_binary_framing_roundtrips() {
        let mut body = vec![0u8, 2, 0xff];
        body.extend_from_slice(b"40");
        body.extend_from_slice(&[1, 4, 0xff, 4, 7, 7, 7]);
        let payload = v3().decode_payload(&body).unwrap();
        assert_eq!(payload.format, PayloadFormat::BinaryFramed);
        assert_eq!(payload.packets[0], EnginePacket::message("0"));
        assert_eq!(payload.packets[1], EnginePacket::binary(vec![7, 7, 7]));
        assert_eq!(v3().encode_payload(payload.format, &payload.packets), body);
    }

    #[test]
    fn v3_binary_framing_rejects_bad_digits() {
        assert!(v3().decode_payload(&[0, 12, 0xff, b'4']).is_err());
        assert!(v3().decode_payload(&[0, 5, 0xff, b'4']).is_err());
    }
}
