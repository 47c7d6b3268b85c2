//! Protocol request classification.
//!
//! # Responsibilities
//! - Recognize Engine.IO traffic (path prefix + `EIO` + `transport` parameters)
//! - Derive the canonical endpoint URL by stripping transport-management parameters
//! - Extract protocol version, transport kind and session id
//!
//! # Design Decisions
//! - Matching is done once, up front; downstream code never re-inspects URLs
//! - A request that matches the pattern but carries unusable parameters is a
//!   classification error, not a silent pass-through

use std::collections::BTreeMap;

use axum::http::{header, Method};
use url::Url;

use super::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher, QueryParamMatcher, RequestHead};
use crate::config::InterceptConfig;
use crate::protocol::{ProtocolVersion, Transport};

pub const EIO_PARAM: &str = "EIO";
pub const TRANSPORT_PARAM: &str = "transport";
pub const SID_PARAM: &str = "sid";
pub const TIMESTAMP_PARAM: &str = "t";
pub const BASE64_PARAM: &str = "b64";

/// Query parameters removed from the canonical endpoint URL.
pub const STRIPPED_PARAMS: [&str; 5] = [EIO_PARAM, TRANSPORT_PARAM, SID_PARAM, TIMESTAMP_PARAM, BASE64_PARAM];

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("unsupported engine.io protocol version {0:?}")]
    UnsupportedVersion(String),

    #[error("unknown transport {0:?}")]
    UnknownTransport(String),

    #[error("invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// A request recognized as Engine.IO traffic.
#[derive(Debug, Clone)]
pub struct ClassifiedRequest {
    pub version: ProtocolVersion,
    pub transport: Transport,
    pub sid: Option<String>,
    /// URL with transport-management parameters stripped.
    pub endpoint_url: Url,
    pub raw_url: Url,
    pub path: String,
    pub method: Method,
    /// Lowercased header names, `host` excluded.
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct Classifier {
    matcher: AndMatcher,
}

impl Classifier {
    pub fn new(config: &InterceptConfig) -> Self {
        let matcher = AndMatcher::new(vec![
            Box::new(HostMatcher::new(config.hosts.iter().cloned())),
            Box::new(PathPrefixMatcher::new(config.path_prefix.clone())),
            Box::new(QueryParamMatcher::new(EIO_PARAM)),
            Box::new(QueryParamMatcher::new(TRANSPORT_PARAM)),
        ]);
        Self { matcher }
    }

    /// `Ok(None)` for traffic outside the protocol.
    pub fn classify(&self, req: &RequestHead) -> Result<Option<ClassifiedRequest>, ClassifyError> {
        if !self.matcher.matches(req) {
            return Ok(None);
        }

        let raw_url = if req.uri.scheme().is_some() {
            Url::parse(&req.uri.to_string())?
        } else {
            let host = req.host().unwrap_or("localhost");
            let path_and_query = req.uri.path_and_query().map_or("/", |pq| pq.as_str());
            Url::parse(&format!("http://{host}{path_and_query}"))?
        };

        let mut version = None;
        let mut transport = None;
        let mut sid = None;
        let mut kept = Vec::new();
        for (key, value) in raw_url.query_pairs() {
            match &*key {
                EIO_PARAM => {
                    version = Some(
                        ProtocolVersion::from_query(&value)
                            .ok_or_else(|| ClassifyError::UnsupportedVersion(value.to_string()))?,
                    );
                }
                TRANSPORT_PARAM => {
                    transport = Some(
                        Transport::from_query(&value)
                            .ok_or_else(|| ClassifyError::UnknownTransport(value.to_string()))?,
                    );
                }
                SID_PARAM if !value.is_empty() => sid = Some(value.to_string()),
                k if STRIPPED_PARAMS.contains(&k) => {}
                _ => kept.push((key.to_string(), value.to_string())),
            }
        }
        // Presence was checked by the matcher; the values may still be empty.
        let version = version.ok_or_else(|| ClassifyError::UnsupportedVersion(String::new()))?;
        let transport = transport.ok_or_else(|| ClassifyError::UnknownTransport(String::new()))?;

        let mut endpoint_url = raw_url.clone();
        if kept.is_empty() {
            endpoint_url.set_query(None);
        } else {
            endpoint_url.query_pairs_mut().clear().extend_pairs(kept);
        }

        let headers = req
            .headers
            .iter()
            .filter(|(name, _)| name.as_str() != header::HOST.as_str())
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect();

        Ok(Some(ClassifiedRequest {
            version,
            transport,
            sid,
            path: raw_url.path().to_string(),
            endpoint_url,
            raw_url,
            method: req.method.clone(),
            headers,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    fn classifier() -> Classifier {
        Classifier::new(&InterceptConfig::default())
    }

    fn head(method: Method, uri: &str) -> RequestHead {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("chat.example.com:3000"));
        headers.insert("cookie", HeaderValue::from_static("io=abc"));
        RequestHead::new(method, uri.parse().unwrap(), headers)
    }

    #[test]
    fn strips_transport_parameters() {
        let req = head(
            Method::GET,
            "/socket.io/?EIO=4&transport=polling&t=NxY1&sid=abc123&b64=1&room=lobby",
        );
        let classified = classifier().classify(&req).unwrap().unwrap();
        assert_eq!(classified.version, ProtocolVersion::V4);
        assert_eq!(classified.transport, Transport::Polling);
        assert_eq!(classified.sid.as_deref(), Some("abc123"));
        assert_eq!(classified.path, "/socket.io/");
        assert_eq!(
            classified.endpoint_url.as_str(),
            "http://chat.example.com:3000/socket.io/?room=lobby"
        );
        assert!(classified.raw_url.as_str().contains("sid=abc123"));
        assert_eq!(classified.headers.get("cookie").map(String::as_str), Some("io=abc"));
        assert!(!classified.headers.contains_key("host"));
    }

    #[test]
    fn endpoint_without_extra_params_has_no_query() {
        let req = head(Method::GET, "/socket.io/?EIO=3&transport=websocket");
        let classified = classifier().classify(&req).unwrap().unwrap();
        assert_eq!(classified.version, ProtocolVersion::V3);
        assert_eq!(classified.transport, Transport::WebSocket);
        assert_eq!(classified.sid, None);
        assert_eq!(classified.endpoint_url.as_str(), "http://chat.example.com:3000/socket.io/");
    }

    #[test]
    fn absolute_form_uri_is_used_directly() {
        let req = head(Method::POST, "http://upstream.test/socket.io/?EIO=4&transport=polling&sid=s1");
        let classified = classifier().classify(&req).unwrap().unwrap();
        assert_eq!(classified.endpoint_url.as_str(), "http://upstream.test/socket.io/");
        assert_eq!(classified.method, Method::POST);
    }

    #[test]
    fn non_protocol_traffic_is_not_classified() {
        assert!(classifier().classify(&head(Method::GET, "/index.html")).unwrap().is_none());
        assert!(classifier()
            .classify(&head(Method::GET, "/socket.io/socket.io.js"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn bad_parameters_are_classification_errors() {
        let unsupported = head(Method::GET, "/socket.io/?EIO=2&transport=polling");
        assert!(matches!(
            classifier().classify(&unsupported),
            Err(ClassifyError::UnsupportedVersion(v)) if v == "2"
        ));
        let unknown = head(Method::GET, "/socket.io/?EIO=4&transport=flashsocket");
        assert!(matches!(
            classifier().classify(&unknown),
            Err(ClassifyError::UnknownTransport(_))
        ));
    }

    #[test]
    fn host_allow_list_limits_classification() {
        let config = InterceptConfig {
            hosts: vec!["other.example.com".into()],
            ..InterceptConfig::default()
        };
        let classifier = Classifier::new(&config);
        let req = head(Method::GET, "/socket.io/?EIO=4&transport=polling");
        assert!(classifier.classify(&req).unwrap().is_none());
    }
}
