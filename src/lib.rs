//! Umami tracking reverse proxy library.

pub mod config;
pub mod encoding;
pub mod http;
pub mod inject;
pub mod lifecycle;
pub mod observability;
pub mod tracking;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
