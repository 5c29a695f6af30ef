//! Observability for the Semker engine
//!
//! Structured logging setup and the process-wide metrics collector. The
//! HTTP surface exposes both through `/health` and `/metrics`.

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use metrics::{metrics, MetricsCollector, MetricsSnapshot, Outcome};

// Span macros for structured logging
pub use logging::{dispatch_span, request_span, retention_span};
