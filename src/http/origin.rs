//! Downstream leg: relays every non-forwarded request to the origin server.
//!
//! # Data Flow
//! ```text
//! request (after the Umami middleware)
//!     → rewrite URI to http://<origin.address><path>?<query>
//!     → strip hop-by-hop, add X-Forwarded-*
//!     → hyper-util client → origin
//!     → strip hop-by-hop from the answer → client
//!
//! Upgrade (websocket):
//!     Connection/Upgrade kept on both legs, 101 answered,
//!     then bytes are copied between the two upgraded connections
//! ```

use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::uri::{Authority, Scheme};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};

use crate::http::headers::{strip_hop_by_hop, write_x_forwarded};
use crate::http::request::{client_ip, request_host};

/// Handler state for the origin leg.
#[derive(Clone)]
pub struct OriginState {
    client: Client<HttpConnector, Body>,
    authority: Authority,
    timeout: Duration,
}

impl OriginState {
    /// `address` is `host:port` of the origin server.
    pub fn new(
        address: &str,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self, axum::http::uri::InvalidUri> {
        let authority: Authority = address.parse()?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            authority,
            timeout,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    fn target_uri(&self, uri: &Uri) -> Result<Uri, axum::http::Error> {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(Scheme::HTTP);
        parts.authority = Some(self.authority.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some("/".parse()?);
        }
        Ok(Uri::from_parts(parts)?)
    }
}

/// Whether `headers` ask for a protocol upgrade.
pub fn is_upgrade(headers: &HeaderMap) -> bool {
    headers.contains_key(header::UPGRADE)
        && headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// Hop-by-hop stripping that keeps `Connection: upgrade` and `Upgrade`.
fn strip_keeping_upgrade(headers: &mut HeaderMap) {
    let upgrade = headers.get(header::UPGRADE).cloned();
    strip_hop_by_hop(headers);
    if let Some(value) = upgrade {
        headers.insert(header::UPGRADE, value);
        headers.insert(header::CONNECTION, header::HeaderValue::from_static("upgrade"));
    }
}

pub async fn origin_handler(State(state): State<OriginState>, mut req: Request) -> Response {
    let path = req.uri().path().to_owned();
    let uri = match state.target_uri(req.uri()) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Failed to build origin URI");
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };

    let upgrade = is_upgrade(req.headers());
    let client_upgrade = upgrade.then(|| hyper::upgrade::on(&mut req));

    let ip = client_ip(&req);
    let host = request_host(&req).map(str::to_owned);
    let (mut parts, body) = req.into_parts();
    parts.uri = uri;
    if upgrade {
        strip_keeping_upgrade(&mut parts.headers);
    } else {
        strip_hop_by_hop(&mut parts.headers);
    }
    write_x_forwarded(&mut parts.headers, ip, host.as_deref());
    let outbound = Request::from_parts(parts, body);

    let mut response = match tokio::time::timeout(state.timeout, state.client.request(outbound)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(path = %path, origin = %state.authority, error = %e, "Origin request failed");
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
        Err(_) => {
            tracing::warn!(path = %path, origin = %state.authority, "Origin request timed out");
            return (StatusCode::GATEWAY_TIMEOUT, "Upstream request timed out").into_response();
        }
    };

    if response.status() == StatusCode::SWITCHING_PROTOCOLS {
        if let Some(client_upgrade) = client_upgrade {
            let origin_upgrade = hyper::upgrade::on(&mut response);
            tokio::spawn(async move {
                match tokio::try_join!(client_upgrade, origin_upgrade) {
                    Ok((client, origin)) => {
                        let mut client = TokioIo::new(client);
                        let mut origin = TokioIo::new(origin);
                        if let Err(e) = tokio::io::copy_bidirectional(&mut client, &mut origin).await {
                            tracing::debug!(error = %e, "Upgraded connection closed");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Protocol upgrade failed"),
                }
            });
            let (mut parts, _) = response.into_parts();
            strip_keeping_upgrade(&mut parts.headers);
            return Response::from_parts(parts, Body::empty());
        }
    }

    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn state() -> OriginState {
        OriginState::new("127.0.0.1:3000", Duration::from_secs(1), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_target_uri() {
        let uri: Uri = "/blog?page=2".parse().unwrap();
        assert_eq!(
            state().target_uri(&uri).unwrap(),
            "http://127.0.0.1:3000/blog?page=2"
        );
    }

    #[test]
    fn test_target_uri_replaces_authority() {
        let uri: Uri = "http://example.com/a".parse().unwrap();
        assert_eq!(state().target_uri(&uri).unwrap(), "http://127.0.0.1:3000/a");
    }

    #[test]
    fn test_invalid_address() {
        assert!(OriginState::new("not a host", Duration::from_secs(1), Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_is_upgrade() {
        let mut headers = HeaderMap::new();
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        assert!(!is_upgrade(&headers));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, Upgrade"));
        assert!(is_upgrade(&headers));
    }

    #[test]
    fn test_strip_keeping_upgrade() {
        let mut headers = HeaderMap::new();
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        strip_keeping_upgrade(&mut headers);
        assert_eq!(headers[header::UPGRADE], "websocket");
        assert_eq!(headers[header::CONNECTION], "upgrade");
        assert!(headers.get("keep-alive").is_none());
    }

    #[tokio::test]
    async fn test_dead_origin_is_bad_gateway() {
        let state = OriginState::new("127.0.0.1:9", Duration::from_secs(1), Duration::from_secs(2)).unwrap();
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = origin_handler(State(state), req).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
