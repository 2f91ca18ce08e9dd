//! Content-encoding negotiation and transcoding.
//!
//! # Data Flow
//! ```text
//! client Accept-Encoding
//!     → negotiate.rs (parse → filter supported → preferred)
//!     → ContentCoding used to re-encode the rewritten body
//!
//! response Content-Encoding
//!     → codec.rs (decode captured body)
//! ```
//!
//! # Design Decisions
//! - Only identity, gzip and deflate are supported
//! - The supported list lives in a `Negotiator` value built once at startup
//! - Whole bodies are transcoded in memory; no streaming codecs

pub mod codec;
pub mod negotiate;

pub use codec::{CodecError, ContentCoding};
pub use negotiate::{Encoding, EncodingSet, Negotiator};
