//! Server-side tracking subsystem.
//!
//! # Data Flow
//! ```text
//! request (non-forwarded, allowed host)
//!     → payload.rs (TrackingEvent: owned copy of the request facts)
//!     → dispatcher.rs BeaconSender::dispatch (non-blocking)
//!     → worker task → POST <umami_host>/api/send
//!
//! Server stopped (all connections drained):
//!     BeaconWorker::shutdown → queue closed → queued beacons sent
//!     → in-flight sends awaited up to the drain timeout
//! ```

pub mod dispatcher;
pub mod payload;

pub use dispatcher::{send_beacon, spawn, BeaconSender, BeaconWorker};
pub use payload::{
    first_language, host_in_domains, hostname_from_host, SendBody, SendPayload, TrackingEvent,
    EVENT_NAME,
};
