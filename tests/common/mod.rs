//! Shared utilities for integration tests: mock Socket.IO upstreams and a
//! proxy bound to an ephemeral port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    http::{header, HeaderMap, Uri},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tower_http::compression::CompressionLayer;

use socketio_proxy::config::ProxyConfig;
use socketio_proxy::events::EventBus;
use socketio_proxy::http::HttpServer;
use socketio_proxy::lifecycle::Shutdown;
use socketio_proxy::net::ConnectionTracker;
use socketio_proxy::session::SessionRegistry;

pub const SID: &str = "it-sid";
pub const HANDSHAKE: &str =
    r#"0{"sid":"it-sid","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
pub const SERVER_PUSH: &str = r#"42["news","from server"]"#;
/// Long enough for the compression layer to kick in.
pub const LARGE_PUSH: &str = r#"42["digest","aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"]"#;

/// A mock upstream and what it received.
pub struct MockUpstream {
    pub addr: SocketAddr,
    pub received: Arc<Mutex<Vec<String>>>,
}

impl MockUpstream {
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

/// Polling upstream: handshake on a GET without `sid`, `SERVER_PUSH` on a GET
/// with one, records POST bodies and answers `ok`. `/health` answers `healthy`.
pub async fn start_polling_upstream() -> MockUpstream {
    let received = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&received);

    let app = Router::new()
        .route(
            "/socket.io/",
            get(|uri: Uri| async move {
                if uri.query().is_some_and(|q| q.contains("sid=")) {
                    SERVER_PUSH
                } else {
                    HANDSHAKE
                }
            })
            .post(move |body: String| async move {
                recorder.lock().unwrap().push(body);
                "ok"
            }),
        )
        .route("/health", get(|| async { "healthy" }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    MockUpstream { addr, received }
}

/// Polling upstream that gzips responses whenever the request accepts gzip.
/// GET answers `LARGE_PUSH`; the `accept-encoding` it saw is recorded.
pub async fn start_gzip_polling_upstream() -> MockUpstream {
    let received = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&received);

    let app = Router::new()
        .route(
            "/socket.io/",
            get(move |headers: HeaderMap| async move {
                let accepted = headers
                    .get(header::ACCEPT_ENCODING)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                recorder.lock().unwrap().push(accepted);
                LARGE_PUSH
            }),
        )
        .layer(CompressionLayer::new());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    MockUpstream { addr, received }
}

/// WebSocket upstream that records every data frame and echoes it back.
/// Binary frames are recorded as `<binary:len>`, a close frame as `<close>`.
pub async fn start_echo_ws_upstream() -> MockUpstream {
    let received = Arc::new(Mutex::new(Vec::new()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let recorder = Arc::clone(&received);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let recorder = Arc::clone(&recorder);
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    match &message {
                        Message::Text(text) => recorder.lock().unwrap().push(text.to_string()),
                        Message::Binary(bytes) => recorder.lock().unwrap().push(format!("<binary:{}>", bytes.len())),
                        Message::Close(_) => {
                            recorder.lock().unwrap().push("<close>".to_string());
                            break;
                        }
                        _ => continue,
                    }
                    if ws.send(message).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    MockUpstream { addr, received }
}

/// WebSocket upstream that records the first data frame, then closes.
pub async fn start_closing_ws_upstream() -> MockUpstream {
    let received = Arc::new(Mutex::new(Vec::new()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let recorder = Arc::clone(&received);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let recorder = Arc::clone(&recorder);
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if let Message::Text(text) = &message {
                        recorder.lock().unwrap().push(text.to_string());
                        let _ = ws.close(None).await;
                        break;
                    }
                }
                // Drain until the peer acknowledges the close.
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });
    MockUpstream { addr, received }
}

/// A running proxy.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub registry: SessionRegistry,
    pub connections: ConnectionTracker,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }

    pub fn ws_url(&self, path_and_query: &str) -> String {
        format!("ws://{}{}", self.addr, path_and_query)
    }
}

pub async fn start_proxy(upstream: SocketAddr, bus: EventBus) -> TestProxy {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.address = upstream.to_string();
    config.observability.metrics_enabled = false;

    let shutdown = Shutdown::new();
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, bus, shutdown.clone());
    let registry = server.registry().clone();
    let connections = server.connections().clone();
    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });

    TestProxy {
        addr,
        registry,
        connections,
        shutdown,
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..40 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
