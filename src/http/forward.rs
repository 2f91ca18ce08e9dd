//! Forward proxy to the Umami collector.
//!
//! # Data Flow
//! ```text
//! /<forward_path>/script.js  ─┐
//! /<forward_path>/api/send   ─┴→ <umami_host>/<suffix>?<query>
//! ```
//!
//! # Design Decisions
//! - Only a fixed suffix list is proxied; everything else under the prefix
//!   follows `umami.unmatched_forward`
//! - Hop-by-hop headers are stripped in both directions
//! - Status, headers and body are relayed verbatim, redirects included
//! - Transport failures become a bare 502; error details only reach the log

use std::net::IpAddr;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::http::headers::{end_to_end, write_x_forwarded};
use crate::http::request::{client_ip, request_host};
use crate::observability::metrics;

/// Collector endpoints reachable through the forward path.
pub const FORWARDED_SUFFIXES: [&str; 2] = ["script.js", "api/send"];

/// Errors on the forward leg. Never shown to the client.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to read client request body: {0}")]
    RequestBody(#[source] axum::Error),

    #[error("collector request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("failed to read collector response body: {0}")]
    ResponseBody(#[source] reqwest::Error),
}

/// Classification of a request path against the forward prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardMatch {
    /// A proxied collector endpoint; holds the suffix.
    Collector(String),
    /// Under the prefix but not a proxied endpoint; holds the suffix.
    Unmatched(String),
    /// Not under the prefix.
    Outside,
}

/// The reserved forward-path subtree.
#[derive(Debug, Clone)]
pub struct ForwardRoute {
    /// `/<prefix>` without trailing slash.
    root: String,
}

impl ForwardRoute {
    /// `forward_prefix` is the configured path without surrounding slashes.
    pub fn new(forward_prefix: &str) -> Self {
        Self {
            root: format!("/{}", forward_prefix.trim_matches('/')),
        }
    }

    pub fn classify(&self, path: &str) -> ForwardMatch {
        let Some(rest) = path.strip_prefix(self.root.as_str()) else {
            return ForwardMatch::Outside;
        };

        match rest.strip_prefix('/') {
            Some(suffix) if FORWARDED_SUFFIXES.contains(&suffix) => {
                ForwardMatch::Collector(suffix.to_string())
            }
            Some(suffix) => ForwardMatch::Unmatched(suffix.to_string()),
            None if rest.is_empty() => ForwardMatch::Unmatched(String::new()),
            // "/_umamix" shares the prefix string only.
            None => ForwardMatch::Outside,
        }
    }
}

/// Target URL on the collector.
pub fn forward_url(umami_base: &str, suffix: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{}/{}?{}", umami_base, suffix, q),
        _ => format!("{}/{}", umami_base, suffix),
    }
}

/// Proxy `req` to `<umami_base>/<suffix>` and relay the answer.
pub async fn forward_to_umami(
    client: &reqwest::Client,
    umami_base: &str,
    suffix: &str,
    req: Request,
    max_body_bytes: usize,
) -> Response {
    let url = forward_url(umami_base, suffix, req.uri().query());

    match relay(client, &url, req, max_body_bytes).await {
        Ok(response) => {
            metrics::record_forward(response.status().as_u16());
            tracing::debug!(url = %url, status = %response.status(), "Forwarded to collector");
            response
        }
        Err(e) => {
            metrics::record_forward(StatusCode::BAD_GATEWAY.as_u16());
            tracing::error!(url = %url, error = %e, "Collector forward failed");
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

async fn relay(
    client: &reqwest::Client,
    url: &str,
    req: Request,
    max_body_bytes: usize,
) -> Result<Response, ForwardError> {
    let ip: Option<IpAddr> = client_ip(&req);
    let host = request_host(&req).map(str::to_owned);

    let (parts, body) = req.into_parts();
    let mut headers = end_to_end(&parts.headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    write_x_forwarded(&mut headers, ip, host.as_deref());

    let body = axum::body::to_bytes(body, max_body_bytes)
        .await
        .map_err(ForwardError::RequestBody)?;

    let upstream = client
        .request(parts.method, url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(ForwardError::Transport)?;

    let status = upstream.status();
    let headers = end_to_end(upstream.headers());
    let body = upstream.bytes().await.map_err(ForwardError::ResponseBody)?;

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
