//! Session record and per-session state.
//!
//! # Responsibilities
//! - Hold identity and metadata learned from every request of one session
//! - Own the two Socket.IO decoders (one per direction)
//! - Serialize all work on a session behind one lock
//!
//! # Design Decisions
//! - Later requests merge into the record; nothing is replaced wholesale
//! - The sid, once known, never changes (it survives the polling → websocket upgrade)
//! - Idle tracking lives outside the state lock so the reaper never blocks on a busy session

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use axum::http::Method;
use serde::Serialize;
use url::Url;

use crate::classify::ClassifiedRequest;
use crate::protocol::{Direction, EngineCodec, ProtocolVersion, SocketDecoder, Transport};

/// Immutable snapshot of a session handed to observers and the admin API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub sid: Option<String>,
    pub version: ProtocolVersion,
    pub transport: Transport,
    /// Canonical endpoint URL.
    pub url: String,
    pub raw_url: String,
    pub path: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub upstream: Option<String>,
}

#[derive(Debug, Default)]
struct Decoders {
    from_client: SocketDecoder,
    from_server: SocketDecoder,
}

#[derive(Debug)]
pub struct SessionState {
    pub sid: Option<String>,
    pub version: ProtocolVersion,
    pub transport: Transport,
    pub endpoint_url: Url,
    pub raw_url: Url,
    pub path: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    /// Upstream chosen by an observer; `None` means the configured default.
    pub upstream: Option<String>,
    pub closed: bool,
    decoders: Decoders,
}

impl SessionState {
    fn from_request(req: &ClassifiedRequest) -> Self {
        Self {
            sid: req.sid.clone(),
            version: req.version,
            transport: req.transport,
            endpoint_url: req.endpoint_url.clone(),
            raw_url: req.raw_url.clone(),
            path: req.path.clone(),
            method: req.method.clone(),
            headers: req.headers.clone(),
            upstream: None,
            closed: false,
            decoders: Decoders::default(),
        }
    }

    /// Fold a later request of the same session into this record.
    pub fn merge(&mut self, req: &ClassifiedRequest) {
        if self.sid.is_none() {
            self.sid = req.sid.clone();
        }
        if req.version != self.version {
            tracing::warn!(
                sid = ?self.sid,
                session_version = self.version.as_str(),
                request_version = req.version.as_str(),
                "Protocol version changed mid-session, keeping the original"
            );
        }
        self.transport = req.transport;
        self.endpoint_url = req.endpoint_url.clone();
        self.raw_url = req.raw_url.clone();
        self.path = req.path.clone();
        self.method = req.method.clone();
        self.headers
            .extend(req.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn codec(&self) -> EngineCodec {
        EngineCodec::new(self.version)
    }

    pub fn decoder_mut(&mut self, direction: Direction) -> &mut SocketDecoder {
        match direction {
            Direction::ClientToServer => &mut self.decoders.from_client,
            Direction::ServerToClient => &mut self.decoders.from_server,
        }
    }

    pub fn snapshot(&self) -> SessionInfo {
        SessionInfo {
            sid: self.sid.clone(),
            version: self.version,
            transport: self.transport,
            url: self.endpoint_url.to_string(),
            raw_url: self.raw_url.to_string(),
            path: self.path.clone(),
            method: self.method.to_string(),
            headers: self.headers.clone(),
            upstream: self.upstream.clone(),
        }
    }
}

/// One logical client↔server session.
#[derive(Debug)]
pub struct Session {
    state: Mutex<SessionState>,
    last_seen: Mutex<Instant>,
}

impl Session {
    pub fn new(req: &ClassifiedRequest) -> Self {
        Self {
            state: Mutex::new(SessionState::from_request(req)),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    /// Exclusive access to the session; also marks it as active.
    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.touch();
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    pub fn sid(&self) -> Option<String> {
        self.lock().sid.clone()
    }

    pub fn info(&self) -> SessionInfo {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }
}
