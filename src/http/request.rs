//! Request inspection helpers.
//!
//! # Responsibilities
//! - Decide whether a request may receive script injection
//! - Extract the client address and the requested host

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request};
use axum::http::{header, Method};

/// Only plain GET requests that are not websocket upgrades are wrapped in a
/// capture buffer.
pub fn could_be_injectable(req: &Request) -> bool {
    if req.method() != Method::GET {
        return false;
    }

    !req.headers()
        .get_all(header::UPGRADE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("websocket"))
}

/// Peer address recorded by `into_make_service_with_connect_info`.
pub fn client_ip(req: &Request) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// `Host` header, falling back to the URI authority (HTTP/2).
pub fn request_host(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(method: Method) -> axum::http::request::Builder {
        axum::http::Request::builder().method(method).uri("http://example.com/")
    }

    #[test]
    fn test_get_is_injectable() {
        let req = request(Method::GET).body(Body::empty()).unwrap();
        assert!(could_be_injectable(&req));
    }

    #[test]
    fn test_non_get_is_not_injectable() {
        for method in [Method::POST, Method::HEAD, Method::PUT] {
            let req = request(method).body(Body::empty()).unwrap();
            assert!(!could_be_injectable(&req));
        }
    }

    #[test]
    fn test_websocket_upgrade_is_not_injectable() {
        let req = request(Method::GET)
            .header(header::UPGRADE, "WebSocket")
            .body(Body::empty())
            .unwrap();
        assert!(!could_be_injectable(&req));
    }

    #[test]
    fn test_request_host() {
        let req = request(Method::GET)
            .header(header::HOST, "site.test:8080")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_host(&req), Some("site.test:8080"));

        let req = request(Method::GET).body(Body::empty()).unwrap();
        assert_eq!(request_host(&req), Some("example.com"));
    }

    #[test]
    fn test_client_ip() {
        let mut req = request(Method::GET).body(Body::empty()).unwrap();
        assert_eq!(client_ip(&req), None);
        req.extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("127.0.0.1:4000".parse().unwrap()));
        assert_eq!(client_ip(&req), Some("127.0.0.1".parse().unwrap()));
    }
}
