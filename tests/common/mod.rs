//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use umami_proxy::config::ProxyConfig;
use umami_proxy::{HttpServer, Shutdown};

pub const PAGE: &str = "<html><head><title>t</title></head><body><p>hello</p></body></html>";
pub const SCRIPT: &str = "fetch('/api/send')";

/// Serve `router` on an ephemeral local port.
pub async fn spawn_app(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A local port nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Origin serving a plain page, a gzip page and a stylesheet.
pub fn origin_router() -> Router {
    Router::new()
        .route(
            "/",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], PAGE) }),
        )
        .route(
            "/gzip",
            get(|| async {
                (
                    [
                        (header::CONTENT_TYPE, "text/html"),
                        (header::CONTENT_ENCODING, "gzip"),
                    ],
                    gzip(PAGE.as_bytes()),
                )
            }),
        )
        .route(
            "/style.css",
            get(|| async { ([(header::CONTENT_TYPE, "text/css")], "body{}</body>") }),
        )
}

/// A request seen by the mock collector.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

#[derive(Clone, Default)]
pub struct Collector {
    pub seen: Arc<Mutex<Vec<Recorded>>>,
}

impl Collector {
    pub fn sends(&self) -> Vec<Recorded> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == "/api/send")
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Recorded> {
        self.seen.lock().unwrap().clone()
    }
}

async fn collector_script(State(collector): State<Collector>, headers: HeaderMap) -> impl IntoResponse {
    collector.seen.lock().unwrap().push(Recorded {
        path: "/script.js".into(),
        headers,
        body: None,
    });
    (
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::PROXY_AUTHENTICATE, "Basic"),
        ],
        SCRIPT,
    )
}

async fn collector_send(
    State(collector): State<Collector>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    collector.seen.lock().unwrap().push(Recorded {
        path: "/api/send".into(),
        headers,
        body: Some(body),
    });
    (StatusCode::OK, Json(serde_json::json!({ "ok": true })))
}

/// Mock Umami collector recording every request it receives.
pub async fn start_collector() -> (SocketAddr, Collector) {
    let collector = Collector::default();
    let router = Router::new()
        .route("/script.js", get(collector_script))
        .route("/api/send", post(collector_send))
        .with_state(collector.clone());
    (spawn_app(router).await, collector)
}

pub fn proxy_config(origin: SocketAddr, collector: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.origin.address = origin.to_string();
    config.umami.umami_host = format!("http://{}", collector);
    config.umami.website_id = "site-1".into();
    config
}

/// A running proxy.
pub struct Proxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

impl Proxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server and beacon worker to stop.
    pub async fn stop(self) {
        self.shutdown.trigger();
        self.handle.await.unwrap();
    }
}

pub async fn start_proxy(config: ProxyConfig) -> Proxy {
    let shutdown = Shutdown::new();
    let server = HttpServer::build(config).await.unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let rx = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });
    Proxy {
        addr,
        shutdown,
        handle,
    }
}

/// HTTP client that neither decompresses nor follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
