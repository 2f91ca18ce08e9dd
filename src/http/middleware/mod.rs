//! Request middleware.

pub mod umami;

pub use umami::{attach, umami_middleware, InjectionOutcome, UmamiState};
