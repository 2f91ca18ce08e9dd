//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, tracing)
//!     → middleware/umami.rs
//!         ├─ forward path → forward.rs → Umami collector
//!         └─ everything else → origin.rs → origin server
//!                                 ↳ HTML answers rewritten on the way back
//!     → Send to client
//! ```

pub mod forward;
pub mod headers;
pub mod middleware;
pub mod origin;
pub mod request;
pub mod server;

pub use forward::{forward_to_umami, ForwardMatch, ForwardRoute};
pub use middleware::UmamiState;
pub use origin::{origin_handler, OriginState};
pub use server::{HttpServer, StartupError};
