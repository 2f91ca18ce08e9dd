//! Umami middleware: forward path, script injection, server-side tracking.
//!
//! # Request States
//! ```text
//! RECEIVED ─┬─ forward path ──────────────────────────→ FORWARD (collector)
//!           └─ EVAL_INJECT ─┬─ ineligible ────────────→ PASSTHROUGH (no capture)
//!                           └─ DOWNSTREAM_CALLED ─┬───→ INJECT ──────┐
//!                                                 └───→ PASSTHROUGH ─┴→ FLUSHED
//! ```
//! After FLUSHED an optional tracking beacon is queued.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::config::{ServerSideTrackingMode, UmamiConfig, UnmatchedForward};
use crate::encoding::Negotiator;
use crate::http::forward::{forward_to_umami, ForwardMatch, ForwardRoute};
use crate::http::request::{could_be_injectable, request_host};
use crate::inject::{load_snippet, Anchor, CaptureBuffer, Fill, Injector, ScriptError};
use crate::observability::metrics;
use crate::tracking::{host_in_domains, BeaconSender, TrackingEvent};

/// Largest client body relayed to the collector.
const MAX_FORWARD_BODY: usize = 1024 * 1024;

/// What happened to a response on the injection path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionOutcome {
    /// Request not eligible; no capture took place.
    Ineligible,
    /// Response was not `text/html`.
    NotHtml,
    /// Body above the capture limit; streamed through.
    TooLarge,
    /// Downstream body could not be read; answered 502.
    ReadFailed,
    /// Body could not be decoded; served unmodified.
    DecodeFailed,
    /// Anchor missing; served unmodified.
    NoAnchor,
    /// Re-encoding failed; served the plain body as identity.
    EncodeFailed,
    /// Snippet inserted.
    Injected,
}

impl InjectionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ineligible => "ineligible",
            Self::NotHtml => "not_html",
            Self::TooLarge => "too_large",
            Self::ReadFailed => "read_failed",
            Self::DecodeFailed => "decode_failed",
            Self::NoAnchor => "no_anchor",
            Self::EncodeFailed => "encode_failed",
            Self::Injected => "injected",
        }
    }
}

/// Shared, read-only middleware state.
#[derive(Clone)]
pub struct UmamiState {
    inner: Arc<UmamiInner>,
}

struct UmamiInner {
    config: UmamiConfig,
    route: ForwardRoute,
    negotiator: Negotiator,
    injector: Injector,
    client: reqwest::Client,
    beacons: Option<BeaconSender>,
}

impl UmamiState {
    /// Assemble the state from a prepared snippet.
    pub fn new(
        config: UmamiConfig,
        snippet: String,
        client: reqwest::Client,
        beacons: Option<BeaconSender>,
    ) -> Self {
        let injector = Injector::new(Anchor::new(config.anchor.clone()), snippet);
        Self {
            inner: Arc::new(UmamiInner {
                route: ForwardRoute::new(config.forward_prefix()),
                negotiator: Negotiator::default(),
                injector,
                client,
                beacons,
                config,
            }),
        }
    }

    /// Build the snippet (downloading the script in `source` mode) and
    /// assemble the state.
    pub async fn build(
        config: UmamiConfig,
        client: reqwest::Client,
        beacons: Option<BeaconSender>,
    ) -> Result<Self, ScriptError> {
        let snippet = load_snippet(&client, &config).await?;
        if config.script_injection {
            tracing::info!(snippet = %snippet, "Script injection enabled");
        } else {
            tracing::info!("Script injection disabled");
        }
        Ok(Self::new(config, snippet, client, beacons))
    }

    pub fn config(&self) -> &UmamiConfig {
        &self.inner.config
    }

    pub fn snippet(&self) -> &[u8] {
        self.inner.injector.snippet()
    }

    fn tracking_event(&self, req: &Request) -> Option<TrackingEvent> {
        let config = &self.inner.config;
        self.inner.beacons.as_ref()?;
        if !config.server_side_tracking {
            return None;
        }
        let host = request_host(req).unwrap_or("");
        if !host_in_domains(host, &config.domains) {
            return None;
        }
        Some(TrackingEvent::from_request(req, &config.website_id))
    }

    fn track(&self, event: TrackingEvent, outcome: InjectionOutcome) {
        let skip = self.inner.config.server_side_tracking_mode == ServerSideTrackingMode::NotInjected
            && outcome == InjectionOutcome::Injected;
        if skip {
            return;
        }
        if let Some(beacons) = &self.inner.beacons {
            beacons.dispatch(event);
        }
    }
}

/// Wrap `router` with the Umami middleware.
pub fn attach(router: Router, state: UmamiState) -> Router {
    router.layer(middleware::from_fn_with_state(state, umami_middleware))
}

pub async fn umami_middleware(
    State(state): State<UmamiState>,
    req: Request,
    next: Next,
) -> Response {
    let inner = &state.inner;

    // RECEIVED
    match inner.route.classify(req.uri().path()) {
        ForwardMatch::Collector(suffix) => return forward(&state, &suffix, req).await,
        ForwardMatch::Unmatched(suffix) => match inner.config.unmatched_forward {
            UnmatchedForward::NotFound => {
                tracing::debug!(path = %req.uri().path(), "Unknown forward path");
                return StatusCode::NOT_FOUND.into_response();
            }
            UnmatchedForward::Forward => return forward(&state, &suffix, req).await,
            UnmatchedForward::Passthrough => {}
        },
        ForwardMatch::Outside => {}
    }

    let event = state.tracking_event(&req);

    // EVAL_INJECT
    let (response, outcome) = if inner.config.script_injection && could_be_injectable(&req) {
        intercept(&state, req, next).await
    } else {
        (next.run(req).await, InjectionOutcome::Ineligible)
    };

    // FLUSHED
    metrics::record_injection(outcome.as_str());
    if let Some(event) = event {
        state.track(event, outcome);
    }
    response
}

async fn forward(state: &UmamiState, suffix: &str, req: Request) -> Response {
    let inner = &state.inner;
    forward_to_umami(&inner.client, inner.config.umami_base(), suffix, req, MAX_FORWARD_BODY).await
}

async fn intercept(state: &UmamiState, mut req: Request, next: Next) -> (Response, InjectionOutcome) {
    let inner = &state.inner;
    let negotiated = inner.negotiator.negotiate(req.headers());
    inner.negotiator.restrict_accept_encoding(req.headers_mut());
    let path = req.uri().path().to_owned();

    // DOWNSTREAM_CALLED
    let (parts, body) = next.run(req).await.into_parts();
    let mut capture = CaptureBuffer::new(parts);

    if !capture.is_injectable() {
        return (capture.pass_through(body), InjectionOutcome::NotHtml);
    }

    let limit = inner.config.max_capture_bytes;
    if capture.declared_length().is_some_and(|len| len > limit as u64) {
        tracing::debug!(path = %path, limit, "HTML body above capture limit, streaming through");
        return (capture.pass_through(body), InjectionOutcome::TooLarge);
    }

    match capture.fill(body, limit).await {
        Ok(Fill::Complete) => {}
        Ok(Fill::Overflow(body)) => {
            tracing::debug!(path = %path, limit, "HTML body above capture limit, streaming through");
            return (capture.pass_through(body), InjectionOutcome::TooLarge);
        }
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Failed to capture downstream body");
            return (
                (StatusCode::BAD_GATEWAY, "Upstream response failed").into_response(),
                InjectionOutcome::ReadFailed,
            );
        }
    }

    let plain = match capture.read_decoded() {
        Ok(plain) => plain,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Failed to decode HTML body, serving it unmodified");
            return (capture.into_response(), InjectionOutcome::DecodeFailed);
        }
    };

    // INJECT
    let Some(rewritten) = inner.injector.inject(&plain) else {
        tracing::debug!(path = %path, "Anchor not found, serving body unmodified");
        return (capture.into_response(), InjectionOutcome::NoAnchor);
    };

    if let Err(e) = capture.write_encoded(rewritten, negotiated) {
        tracing::warn!(
            path = %path,
            coding = negotiated.name(),
            error = %e,
            "Failed to encode rewritten body, serving original as identity"
        );
        capture.write_plain(plain);
        return (capture.into_response(), InjectionOutcome::EncodeFailed);
    }

    tracing::debug!(path = %path, coding = negotiated.name(), "Injected tracking snippet");
    (capture.into_response(), InjectionOutcome::Injected)
}
