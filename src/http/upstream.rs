//! Upstream HTTP client.

use std::time::Duration;

use axum::body::Body;
use axum::http::{request, Request, Response, Uri, Version};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use super::response::strip_hop_by_hop;
use super::ProxyError;
use crate::config::{TimeoutConfig, UpstreamConfig};
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client<HttpConnector, Body>,
    default_target: String,
    connect_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(upstream: &UpstreamConfig, timeouts: &TimeoutConfig) -> Self {
        let connect_timeout = Duration::from_secs(timeouts.connect_secs);
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            default_target: upstream.address.clone(),
            connect_timeout,
        }
    }

    pub fn default_target(&self) -> &str {
        &self.default_target
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Upstream authority for a session: an observer's choice, else the default.
    pub fn target_for(&self, session: &Session) -> String {
        session
            .lock()
            .upstream
            .clone()
            .unwrap_or_else(|| self.default_target.clone())
    }

    /// `http://<target><original path and query>`
    pub fn build_uri(target: &str, original: &Uri) -> Result<Uri, ProxyError> {
        let path_and_query = original.path_and_query().map_or("/", |pq| pq.as_str());
        Ok(format!("http://{target}{path_and_query}").parse()?)
    }

    /// `ws://<target><original path and query>`
    pub fn ws_url(target: &str, original: &Uri) -> String {
        let path_and_query = original.path_and_query().map_or("/", |pq| pq.as_str());
        format!("ws://{target}{path_and_query}")
    }

    /// Send a request to `target`, keeping method, path, query and end-to-end headers.
    pub async fn forward(
        &self,
        target: &str,
        mut parts: request::Parts,
        body: Body,
    ) -> Result<Response<Incoming>, ProxyError> {
        parts.uri = Self::build_uri(target, &parts.uri)?;
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);
        let request = Request::from_parts(parts, body);
        Ok(self.client.request(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_upstream_uris_from_original_path() {
        let original: Uri = "/socket.io/?EIO=4&transport=polling&sid=a".parse().unwrap();
        let uri = UpstreamClient::build_uri("127.0.0.1:3000", &original).unwrap();
        assert_eq!(uri.to_string(), "http://127.0.0.1:3000/socket.io/?EIO=4&transport=polling&sid=a");
        assert_eq!(
            UpstreamClient::ws_url("upstream:80", &original),
            "ws://upstream:80/socket.io/?EIO=4&transport=polling&sid=a"
        );

        let absolute: Uri = "http://chat.example.com/".parse().unwrap();
        assert_eq!(
            UpstreamClient::build_uri("10.0.0.1:80", &absolute).unwrap().to_string(),
            "http://10.0.0.1:80/"
        );
    }

    #[test]
    fn observer_target_overrides_default() {
        use crate::session::context::tests::classified;

        let client = UpstreamClient::new(&UpstreamConfig::default(), &TimeoutConfig::default());
        let session = Session::new(&classified("/socket.io/?EIO=4&transport=polling", &[]));
        assert_eq!(client.target_for(&session), "127.0.0.1:3000");
        session.lock().upstream = Some("10.1.1.1:4000".into());
        assert_eq!(client.target_for(&session), "10.1.1.1:4000");
    }
}
