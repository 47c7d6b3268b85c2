//! Interception pipeline.
//!
//! # Data Flow
//! ```text
//! HTTP request head
//!     → classify (Classifier → SessionRegistry → `connection` event)
//!
//! polling body / websocket frame (one direction)
//!     → EngineCodec decode
//!     → per packet: `engine` event
//!         open    → Handshake → register sid → `open` event
//!         message → SocketDecoder → `socket` event → `message` event → forward
//!         upgrade → session transport = websocket
//!         close   → forward, then evict
//!     → EngineCodec encode (original bytes when nothing changed)
//! ```
//!
//! # Design Decisions
//! - Everything for one body or frame runs under the session lock
//! - Decode failures never block traffic: the original bytes go through and an
//!   `error` event is emitted
//! - A polling body whose packets were all dropped becomes a single `noop`

use std::sync::Arc;

use crate::classify::{ClassifiedRequest, Classifier, RequestHead};
use crate::config::InterceptConfig;
use crate::events::{
    ConnectionEvent, EngineEvent, ErrorEvent, ErrorKind, EventBus, MessageEvent, OpenEvent, SocketEvent,
};
use crate::forward::{self, Verdict};
use crate::observability::metrics;
use crate::protocol::{
    DecodedPacket, Direction, EnginePacket, EnginePacketType, Handshake, Message, Transport, WsFrame,
};
use crate::session::{Session, SessionRegistry, SessionState};

pub use crate::classify::ClassifyError;

/// A request attributed to a session.
#[derive(Debug, Clone)]
pub struct Classified {
    pub session: Arc<Session>,
    pub request: ClassifiedRequest,
}

#[derive(Debug)]
pub struct Interceptor {
    classifier: Classifier,
    registry: SessionRegistry,
    bus: Arc<EventBus>,
}

impl Interceptor {
    pub fn new(config: &InterceptConfig, registry: SessionRegistry, bus: Arc<EventBus>) -> Self {
        Self {
            classifier: Classifier::new(config),
            registry,
            bus,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Attribute a request to a session, or `None` for traffic that is left alone.
    pub fn classify(&self, head: &RequestHead) -> Option<Classified> {
        let request = match self.classifier.classify(head) {
            Ok(Some(request)) => request,
            Ok(None) => {
                tracing::debug!(method = %head.method, uri = %head.uri, "Out-of-protocol request");
                return None;
            }
            Err(e) => {
                self.report_error(
                    ErrorEvent::new(ErrorKind::Classification, e.to_string()).with_raw(head.uri.to_string()),
                );
                return None;
            }
        };

        let session = self.registry.lookup_or_create(&request);
        let decision = self.bus.emit_connection(&ConnectionEvent {
            session: session.info(),
            from_server: false,
        });
        if let Some(upstream) = decision.upstream() {
            session.lock().upstream = Some(upstream.to_string());
        }
        Some(Classified { session, request })
    }

    /// Process one polling body and return the bytes to deliver.
    pub fn on_polling_body(&self, session: &Arc<Session>, direction: Direction, body: &[u8]) -> Vec<u8> {
        let mut state = session.lock();
        let codec = state.codec();
        let payload = match codec.decode_payload(body) {
            Ok(payload) => payload,
            Err(e) => {
                let sid = state.sid.clone();
                drop(state);
                self.report_error(
                    ErrorEvent::new(ErrorKind::Decode, e.to_string())
                        .with_sid(sid)
                        .with_direction(direction)
                        .with_raw(body),
                );
                return body.to_vec();
            }
        };

        let mut out = Vec::with_capacity(payload.packets.len());
        for packet in payload.packets.iter().cloned() {
            self.process_packet(session, &mut state, direction, packet, &mut out);
        }
        let closed = state.closed.then(|| state.sid.clone()).flatten();
        drop(state);
        self.evict_closed(closed);

        if out == payload.packets {
            return body.to_vec();
        }
        if out.is_empty() {
            out.push(EnginePacket::noop());
        }
        codec.encode_payload(payload.format, &out)
    }

    /// Process one WebSocket data frame and return the frames to deliver.
    pub fn on_ws_frame(&self, session: &Arc<Session>, direction: Direction, frame: WsFrame) -> Vec<WsFrame> {
        let mut state = session.lock();
        let codec = state.codec();
        let packet = match codec.decode_frame(&frame) {
            Ok(packet) => packet,
            Err(e) => {
                let sid = state.sid.clone();
                drop(state);
                let raw = match &frame {
                    WsFrame::Text(text) => text.as_bytes().to_vec(),
                    WsFrame::Binary(bytes) => bytes.clone(),
                };
                self.report_error(
                    ErrorEvent::new(ErrorKind::Decode, e.to_string())
                        .with_sid(sid)
                        .with_direction(direction)
                        .with_raw(raw),
                );
                return vec![frame];
            }
        };

        let mut out = Vec::new();
        self.process_packet(session, &mut state, direction, packet.clone(), &mut out);
        let closed = state.closed.then(|| state.sid.clone()).flatten();
        drop(state);
        self.evict_closed(closed);

        if out.len() == 1 && out[0] == packet {
            return vec![frame];
        }
        out.iter().map(|p| codec.encode_frame(p)).collect()
    }

    /// The transport carrying this session went away.
    pub fn end_session(&self, session: &Session) {
        if let Some(sid) = session.sid() {
            self.registry.remove(&sid);
        }
    }

    pub fn report_error(&self, event: ErrorEvent) {
        metrics::record_error(event.kind);
        tracing::warn!(
            kind = event.kind.as_str(),
            sid = ?event.sid,
            direction = ?event.direction,
            error = %event.message,
            "Interception error"
        );
        self.bus.emit_error(&event);
    }

    fn evict_closed(&self, sid: Option<String>) {
        if let Some(sid) = sid {
            self.registry.remove(&sid);
        }
    }

    fn process_packet(
        &self,
        session: &Arc<Session>,
        state: &mut SessionState,
        direction: Direction,
        packet: EnginePacket,
        out: &mut Vec<EnginePacket>,
    ) {
        metrics::record_engine_packet(direction, packet.packet_type);
        let decision = self
            .bus
            .emit_engine(&EngineEvent::new(state.sid.clone(), direction, packet.clone()));
        if decision.is_dropped() {
            metrics::record_dropped(direction, "engine");
            return;
        }

        match packet.packet_type {
            EnginePacketType::Open => {
                self.on_open(session, state, direction, &packet);
                out.push(packet);
            }
            EnginePacketType::Message => self.on_message(state, direction, packet, out),
            EnginePacketType::Upgrade => {
                state.transport = Transport::WebSocket;
                out.push(packet);
            }
            EnginePacketType::Close => {
                state.closed = true;
                out.push(packet);
            }
            EnginePacketType::Ping | EnginePacketType::Pong | EnginePacketType::Noop => out.push(packet),
        }
    }

    fn on_open(&self, session: &Arc<Session>, state: &mut SessionState, direction: Direction, packet: &EnginePacket) {
        let handshake = match Handshake::parse(packet) {
            Ok(handshake) => handshake,
            Err(e) => {
                self.report_error(
                    ErrorEvent::new(ErrorKind::Decode, format!("invalid handshake: {e}"))
                        .with_sid(state.sid.clone())
                        .with_direction(direction)
                        .with_raw(packet.data.to_bytes()),
                );
                return;
            }
        };

        match &state.sid {
            None => state.sid = Some(handshake.sid.clone()),
            Some(sid) if *sid != handshake.sid => {
                tracing::warn!(sid = %sid, handshake_sid = %handshake.sid, "Handshake announced a different sid, keeping the original");
            }
            Some(_) => {}
        }

        let registered = self.registry.register(&handshake.sid, Arc::clone(session));
        if !Arc::ptr_eq(&registered, session) {
            tracing::warn!(sid = %handshake.sid, "Sid already registered to another session");
        }

        let decision = self.bus.emit_open(&OpenEvent {
            sid: handshake.sid.clone(),
            session: state.snapshot(),
            handshake,
            from_server: direction.from_server(),
        });
        if let Some(upstream) = decision.upstream() {
            state.upstream = Some(upstream.to_string());
        }
    }

    fn on_message(&self, state: &mut SessionState, direction: Direction, packet: EnginePacket, out: &mut Vec<EnginePacket>) {
        let sid = state.sid.clone();
        let decoder = state.decoder_mut(direction);
        if decoder.is_failed() {
            metrics::record_undecoded(direction);
            out.push(packet);
            return;
        }

        match decoder.add(&packet.data) {
            Ok(None) => {}
            Ok(Some(decoded)) => {
                let url = state.endpoint_url.to_string();
                self.on_socket_packet(sid, url, direction, decoded, out);
            }
            Err(e) => {
                let withheld = decoder.take_withheld();
                self.report_error(
                    ErrorEvent::new(ErrorKind::Decode, e.to_string())
                        .with_sid(sid)
                        .with_direction(direction)
                        .with_raw(packet.data.to_bytes()),
                );
                out.extend(
                    withheld
                        .into_iter()
                        .map(|data| EnginePacket::new(EnginePacketType::Message, data)),
                );
                out.push(packet);
            }
        }
    }

    fn on_socket_packet(
        &self,
        sid: Option<String>,
        url: String,
        direction: Direction,
        decoded: DecodedPacket,
        out: &mut Vec<EnginePacket>,
    ) {
        metrics::record_socket_packet(direction, decoded.packet.packet_type);
        let decision = self
            .bus
            .emit_socket(&SocketEvent::new(sid.clone(), direction, decoded.packet.clone()));
        if decision.is_dropped() {
            metrics::record_dropped(direction, "socket");
            return;
        }

        let verdict = match Message::from_packet(&decoded.packet, direction, sid) {
            Some(message) => Verdict::from(self.bus.emit_message(&MessageEvent::new(message, url))),
            None => Verdict::Verbatim,
        };
        match &verdict {
            Verdict::Drop => metrics::record_dropped(direction, "message"),
            Verdict::Rewrite(_) => metrics::record_rewritten(direction),
            Verdict::Verbatim => {}
        }
        forward::forward(&decoded, verdict, out);
    }
}
