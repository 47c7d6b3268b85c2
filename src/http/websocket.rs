//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Complete the upgrade handshake with the client once the upstream accepted
//! - Relay frames in both directions through the interceptor
//! - Tear down both sides together
//!
//! # Data Flow
//! ```text
//! Client ←── frames ──→ on_ws_frame(ClientToServer) ──→ Upstream
//! Client ←── on_ws_frame(ServerToClient) ←── frames ──→ Upstream
//! ```
//!
//! # Design Decisions
//! - Upstream is dialed before the client upgrade completes, so a dead
//!   upstream is a plain 502 instead of a socket that closes immediately
//! - Close frames end the relay; the other side is closed actively
//! - Ping/pong are answered by each side's own WebSocket stack

use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::{Message as ClientMessage, WebSocket, WebSocketUpgrade};
use axum::extract::FromRequestParts;
use axum::http::{header, HeaderName, Request};
use axum::response::{IntoResponse, Response};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::server::AppState;
use super::upstream::UpstreamClient;
use super::ProxyError;
use crate::events::{ErrorEvent, ErrorKind};
use crate::intercept::{Classified, Interceptor};
use crate::lifecycle::Shutdown;
use crate::net::ConnectionGuard;
use crate::protocol::{Direction, WsFrame};
use crate::session::Session;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handshake headers the upstream client generates itself.
fn is_handshake_header(name: &HeaderName) -> bool {
    *name == header::HOST
        || *name == header::CONNECTION
        || *name == header::UPGRADE
        || *name == header::CONTENT_LENGTH
        || *name == header::TRANSFER_ENCODING
        || name.as_str().starts_with("sec-websocket-")
}

pub fn is_upgrade_request<B>(request: &Request<B>) -> bool {
    request
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

pub async fn handle(state: AppState, classified: Classified, request: Request<Body>) -> Result<Response, ProxyError> {
    let (mut parts, _body) = request.into_parts();
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let session = classified.session;
    let target = state.upstream.target_for(&session);
    let url = UpstreamClient::ws_url(&target, &parts.uri);

    let mut upstream_request = url.as_str().into_client_request()?;
    for (name, value) in parts.headers.iter().filter(|(name, _)| !is_handshake_header(name)) {
        upstream_request.headers_mut().append(name.clone(), value.clone());
    }

    let connect = tokio::time::timeout(state.upstream.connect_timeout(), connect_async(upstream_request));
    let (upstream, _) = match connect.await {
        Ok(Ok(connected)) => connected,
        Ok(Err(e)) => {
            let err = ProxyError::from(e);
            report(&state.interceptor, &session, &err);
            return Err(err);
        }
        Err(_) => {
            report(&state.interceptor, &session, &ProxyError::Timeout);
            return Err(ProxyError::Timeout);
        }
    };

    tracing::debug!(sid = ?session.sid(), upstream = %url, "Upstream websocket connected");
    let guard = state.connections.track(session.sid(), target);
    let interceptor = Arc::clone(&state.interceptor);
    let shutdown = state.shutdown.clone();

    Ok(upgrade
        .on_failed_upgrade(|e| tracing::warn!(error = %e, "Client websocket upgrade failed"))
        .on_upgrade(move |client| relay(interceptor, session, client, upstream, shutdown, guard)))
}

async fn relay(
    interceptor: Arc<Interceptor>,
    session: Arc<Session>,
    client: WebSocket,
    upstream: UpstreamSocket,
    shutdown: Shutdown,
    guard: ConnectionGuard,
) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let outcome = tokio::select! {
        r = pump_from_client(&interceptor, &session, &mut client_rx, &mut upstream_tx) => r,
        r = pump_from_upstream(&interceptor, &session, &mut upstream_rx, &mut client_tx) => r,
        _ = shutdown.wait() => Ok(()),
    };
    if let Err(e) = &outcome {
        report(&interceptor, &session, e);
    }

    let _ = client_tx.send(ClientMessage::Close(None)).await;
    let _ = client_tx.close().await;
    let _ = upstream_tx.send(UpstreamMessage::Close(None)).await;
    let _ = upstream_tx.close().await;

    tracing::debug!(connection_id = %guard.id(), sid = ?session.sid(), "Websocket relay ended");
    interceptor.end_session(&session);
}

async fn pump_from_client(
    interceptor: &Interceptor,
    session: &Arc<Session>,
    rx: &mut SplitStream<WebSocket>,
    tx: &mut SplitSink<UpstreamSocket, UpstreamMessage>,
) -> Result<(), ProxyError> {
    while let Some(message) = rx.next().await {
        let frame = match message.map_err(ProxyError::Client)? {
            ClientMessage::Text(text) => WsFrame::Text(text.as_str().to_string()),
            ClientMessage::Binary(bytes) => WsFrame::Binary(bytes.to_vec()),
            ClientMessage::Ping(_) | ClientMessage::Pong(_) => continue,
            ClientMessage::Close(_) => return Ok(()),
        };
        for out in interceptor.on_ws_frame(session, Direction::ClientToServer, frame) {
            let message = match out {
                WsFrame::Text(text) => UpstreamMessage::Text(text.into()),
                WsFrame::Binary(bytes) => UpstreamMessage::Binary(bytes.into()),
            };
            tx.send(message).await?;
        }
    }
    Ok(())
}

async fn pump_from_upstream(
    interceptor: &Interceptor,
    session: &Arc<Session>,
    rx: &mut SplitStream<UpstreamSocket>,
    tx: &mut SplitSink<WebSocket, ClientMessage>,
) -> Result<(), ProxyError> {
    while let Some(message) = rx.next().await {
        let frame = match message? {
            UpstreamMessage::Text(text) => WsFrame::Text(text.as_str().to_string()),
            UpstreamMessage::Binary(bytes) => WsFrame::Binary(bytes.to_vec()),
            UpstreamMessage::Ping(_) | UpstreamMessage::Pong(_) | UpstreamMessage::Frame(_) => continue,
            UpstreamMessage::Close(_) => return Ok(()),
        };
        for out in interceptor.on_ws_frame(session, Direction::ServerToClient, frame) {
            let message = match out {
                WsFrame::Text(text) => ClientMessage::Text(text.into()),
                WsFrame::Binary(bytes) => ClientMessage::Binary(bytes.into()),
            };
            tx.send(message).await.map_err(ProxyError::Client)?;
        }
    }
    Ok(())
}

fn report(interceptor: &Interceptor, session: &Session, error: &ProxyError) {
    interceptor.report_error(ErrorEvent::new(ErrorKind::Transport, error.to_string()).with_sid(session.sid()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_headers_are_not_forwarded() {
        assert!(is_handshake_header(&header::HOST));
        assert!(is_handshake_header(&header::SEC_WEBSOCKET_KEY));
        assert!(is_handshake_header(&HeaderName::from_static("sec-websocket-extensions")));
        assert!(!is_handshake_header(&header::COOKIE));
        assert!(!is_handshake_header(&header::USER_AGENT));
    }

    #[test]
    fn detects_upgrade_requests() {
        let request = Request::builder()
            .header(header::UPGRADE, "WebSocket")
            .body(())
            .unwrap();
        assert!(is_upgrade_request(&request));
        assert!(!is_upgrade_request(&Request::new(())));
    }
}
