//! Background processing of accepted requests
//!
//! The [`ProcessingScheduler`] turns each submission into one supervised
//! background unit; [`retention`] keeps the in-memory stores bounded.

pub mod retention;
pub mod scheduler;

pub use retention::{spawn_retention_sweeper, sweep_once, SweepReport};
pub use scheduler::{ProcessingScheduler, PROCESSING_STARTED_MESSAGE};
