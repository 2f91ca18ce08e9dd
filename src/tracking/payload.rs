//! Collector event payload and the request facts it is built from.

use axum::extract::Request;
use axum::http::{header, HeaderMap};
use serde::Serialize;

use crate::http::headers::{end_to_end, header_str, write_x_forwarded};
use crate::http::request::{client_ip, request_host};

/// Event name attached to server-side beacons.
pub const EVENT_NAME: &str = "umami-proxy";

/// `payload` object of a `POST /api/send` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendPayload {
    pub website: String,
    pub hostname: String,
    pub language: String,
    pub url: String,
    pub referer: String,
    pub name: String,
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// Body of a `POST /api/send` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendBody {
    pub payload: SendPayload,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A beacon ready to be sent. Owns copies of everything it needs so it can
/// outlive the request it describes.
#[derive(Debug, Clone)]
pub struct TrackingEvent {
    pub body: SendBody,
    pub headers: HeaderMap,
}

impl TrackingEvent {
    pub fn from_request(req: &Request, website_id: &str) -> Self {
        let headers = req.headers();
        let host = request_host(req);

        let payload = SendPayload {
            website: website_id.to_string(),
            hostname: host.map(hostname_from_host).unwrap_or_default().to_string(),
            language: first_language(header_str(headers, header::ACCEPT_LANGUAGE)).to_string(),
            url: req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string()),
            referer: header_str(headers, header::REFERER).to_string(),
            name: EVENT_NAME.to_string(),
            data: serde_json::Map::new(),
        };

        let mut beacon_headers = end_to_end(headers);
        for name in [
            header::HOST,
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
            header::CONTENT_ENCODING,
            header::ACCEPT_ENCODING,
        ] {
            beacon_headers.remove(name);
        }
        write_x_forwarded(&mut beacon_headers, client_ip(req), host);

        Self {
            body: SendBody {
                payload,
                kind: "event".to_string(),
            },
            headers: beacon_headers,
        }
    }
}

/// Host without its port. Bracketed IPv6 literals keep their brackets.
pub fn hostname_from_host(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    host.split(':').next().unwrap_or(host)
}

/// First locale token of an `Accept-Language` header, or `""`.
pub fn first_language(accept_language: &str) -> &str {
    accept_language
        .split(',')
        .map(|entry| entry.split(';').next().unwrap_or("").trim())
        .find(|tag| !tag.is_empty() && tag.bytes().all(|b| b.is_ascii_alphabetic() || b == b'-'))
        .unwrap_or("")
}

/// Whether `host` is allowed by `domains`. An empty list allows every host.
pub fn host_in_domains(host: &str, domains: &[String]) -> bool {
    if domains.is_empty() {
        return true;
    }
    let hostname = hostname_from_host(host);
    domains.iter().any(|d| d.eq_ignore_ascii_case(hostname))
}
