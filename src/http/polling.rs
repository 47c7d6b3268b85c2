//! Long-polling transport.
//!
//! POST bodies are client→server payloads and are rewritten before forwarding.
//! Successful GET responses are server→client payloads and are rewritten
//! before they reach the client. Everything else is forwarded as is.
//! `Accept-Encoding` is withheld from the upstream so response payloads stay
//! readable.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;

use super::response::{from_upstream, strip_hop_by_hop};
use super::server::AppState;
use super::ProxyError;
use crate::events::{ErrorEvent, ErrorKind};
use crate::intercept::Classified;
use crate::protocol::Direction;
use crate::session::Session;

pub async fn handle(state: &AppState, classified: Classified, request: Request<Body>) -> Result<Response, ProxyError> {
    let session = classified.session;
    let target = state.upstream.target_for(&session);
    let (mut parts, body) = request.into_parts();
    let method = parts.method.clone();
    // Payloads must reach the codec uncompressed.
    parts.headers.remove(header::ACCEPT_ENCODING);

    let body = if method == Method::POST {
        let bytes = axum::body::to_bytes(body, state.max_body_size)
            .await
            .map_err(ProxyError::Body)?;
        let rewritten = state
            .interceptor
            .on_polling_body(&session, Direction::ClientToServer, &bytes);
        parts.headers.remove(header::CONTENT_LENGTH);
        Body::from(rewritten)
    } else {
        body
    };

    let response = state
        .upstream
        .forward(&target, parts, body)
        .await
        .inspect_err(|e| report_transport_error(state, &session, e))?;

    if method != Method::GET || !response.status().is_success() {
        return Ok(from_upstream(response));
    }

    let (mut parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(Body::new(body), state.max_body_size)
        .await
        .map_err(|e| {
            let err = ProxyError::UpstreamBody(e);
            report_transport_error(state, &session, &err);
            err
        })?;
    let rewritten = state
        .interceptor
        .on_polling_body(&session, Direction::ServerToClient, &bytes);

    strip_hop_by_hop(&mut parts.headers);
    parts.headers.remove(header::CONTENT_LENGTH);
    Ok(Response::from_parts(parts, Body::from(rewritten)))
}

fn report_transport_error(state: &AppState, session: &Arc<Session>, error: &ProxyError) {
    state
        .interceptor
        .report_error(ErrorEvent::new(ErrorKind::Transport, error.to_string()).with_sid(session.sid()));
}
