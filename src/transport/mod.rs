//! Transport layer
//!
//! The HTTP surface clients use to submit requests and poll their updates.

pub mod http;

pub use http::{routes, serve, ApiState};
