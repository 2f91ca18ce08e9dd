//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared collector client and the Umami middleware state
//! - Start the beacon worker when server-side tracking is on
//! - Wire up middleware (Umami, timeout, request ID, tracing)
//! - Serve until the shutdown signal, then drain beacons once the last
//!   in-flight request has finished

use std::net::SocketAddr;
use std::time::Duration;

use axum::routing::any;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::http::middleware::umami::{attach, UmamiState};
use crate::http::origin::{origin_handler, OriginState};
use crate::inject::ScriptError;
use crate::tracking::{self, BeaconWorker};

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build collector client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid origin address: {0}")]
    Origin(#[source] axum::http::uri::InvalidUri),

    #[error("failed to prepare tracking script: {0}")]
    Script(#[source] ScriptError),
}

/// HTTP server for the tracking proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    beacons: Option<BeaconWorker>,
}

impl HttpServer {
    /// Prepare the router. Downloads the tracking script in `source` mode.
    pub async fn build(config: ProxyConfig) -> Result<Self, StartupError> {
        let timeouts = &config.timeouts;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.upstream_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(StartupError::Client)?;

        let origin = OriginState::new(
            &config.origin.address,
            Duration::from_secs(timeouts.connect_secs),
            Duration::from_secs(timeouts.request_secs),
        )
        .map_err(StartupError::Origin)?;

        let (sender, worker) = if config.umami.server_side_tracking {
            let endpoint = format!("{}/api/send", config.umami.umami_base());
            let (sender, worker) = tracking::spawn(client.clone(), endpoint, &config.tracking);
            (Some(sender), Some(worker))
        } else {
            (None, None)
        };

        let umami = UmamiState::build(config.umami.clone(), client, sender)
            .await
            .map_err(StartupError::Script)?;

        let router = Self::build_router(&config, origin, umami);
        Ok(Self {
            router,
            config,
            beacons: worker,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(config: &ProxyConfig, origin: OriginState, umami: UmamiState) -> Router {
        let router = Router::new()
            .route("/", any(origin_handler))
            .route("/{*path}", any(origin_handler))
            .with_state(origin);

        attach(router, umami)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve until `shutdown` fires, then wait for queued beacons.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            origin = %self.config.origin.address,
            forward_path = %self.config.umami.forward_prefix(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        // Graceful shutdown has waited for every connection, so no request
        // can dispatch a beacon any more.
        if let Some(worker) = self.beacons {
            worker.shutdown().await;
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}
