//! HTML rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! downstream response
//!     → capture.rs (buffer head + body, decide injectability)
//!     → codec decode (declared Content-Encoding)
//!     → injector.rs (splice snippet before the anchor)
//!     → codec encode (client's negotiated coding)
//!     → capture.rs (framing headers, flush)
//!
//! startup
//!     → script.rs (build snippet, download script in source mode)
//! ```

pub mod capture;
pub mod injector;
pub mod script;

pub use capture::{CaptureBuffer, CaptureError, Fill, INJECTABLE_CONTENT_TYPE};
pub use injector::{insert_at_anchor, try_insert_at_anchor, Anchor, Injector};
pub use script::{build_snippet, download_script, load_snippet, ScriptError};
