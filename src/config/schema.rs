//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the tracking proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Origin server that receives every non-forwarded request.
    pub origin: OriginConfig,

    /// Umami tracking settings.
    pub umami: UmamiConfig,

    /// Server-side tracking beacon queue.
    pub tracking: TrackingQueueConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Origin (downstream) server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Origin address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// How the tracking snippet loads the Umami script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptInjectionMode {
    /// Reference the script through the forward path.
    Tag,
    /// Inline the downloaded script content.
    Source,
}

/// When server-side beacons are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerSideTrackingMode {
    /// Every request on an allowed host.
    All,
    /// Only requests whose response did not receive the snippet.
    NotInjected,
}

/// What to do with a path under the forward prefix that is not one of the
/// proxied collector endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedForward {
    /// Answer 404 without touching the collector or the origin.
    NotFound,
    /// Proxy any suffix to the collector.
    Forward,
    /// Hand the request to the origin like any other path.
    Passthrough,
}

/// Umami tracking configuration.
///
/// Immutable after startup and shared read-only by every request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UmamiConfig {
    /// Path prefix reserved for the collector (without slashes).
    pub forward_path: String,

    /// Base URL of the Umami instance (e.g., "https://umami.example.com").
    pub umami_host: String,

    /// Umami website id.
    pub website_id: String,

    /// Emit `data-auto-track`.
    pub auto_track: bool,

    /// Emit `data-do-not-track`.
    pub do_not_track: bool,

    /// Emit `data-cache`.
    pub cache: bool,

    /// Allowed hostnames. Empty means every host.
    pub domains: Vec<String>,

    /// Create the script element at runtime instead of a static tag.
    pub evade_google_tag_manager: bool,

    /// Inject the tracking snippet into HTML responses.
    pub script_injection: bool,

    /// Tag or inline source.
    pub script_injection_mode: ScriptInjectionMode,

    /// Send tracking beacons from the proxy itself.
    pub server_side_tracking: bool,

    /// Which requests produce a beacon.
    pub server_side_tracking_mode: ServerSideTrackingMode,

    /// Handling of unknown paths under the forward prefix.
    pub unmatched_forward: UnmatchedForward,

    /// Literal the snippet is inserted before.
    pub anchor: String,

    /// Largest response body buffered for injection, in bytes.
    pub max_capture_bytes: usize,
}

impl Default for UmamiConfig {
    fn default() -> Self {
        Self {
            forward_path: "_umami".to_string(),
            umami_host: String::new(),
            website_id: String::new(),
            auto_track: true,
            do_not_track: false,
            cache: false,
            domains: Vec::new(),
            evade_google_tag_manager: false,
            script_injection: true,
            script_injection_mode: ScriptInjectionMode::Tag,
            server_side_tracking: false,
            server_side_tracking_mode: ServerSideTrackingMode::All,
            unmatched_forward: UnmatchedForward::NotFound,
            anchor: "</body>".to_string(),
            max_capture_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl UmamiConfig {
    /// Forward path without leading or trailing slashes.
    pub fn forward_prefix(&self) -> &str {
        self.forward_path.trim_matches('/')
    }

    /// Umami host without a trailing slash.
    pub fn umami_base(&self) -> &str {
        self.umami_host.trim_end_matches('/')
    }
}

/// Beacon worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackingQueueConfig {
    /// Beacons buffered before new ones are dropped.
    pub queue_capacity: usize,

    /// Concurrent beacon requests.
    pub max_in_flight: usize,

    /// Time allowed for queued beacons to finish on shutdown, in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for TrackingQueueConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_in_flight: 16,
            drain_timeout_secs: 5,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Timeout for calls to the Umami collector in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            upstream_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
