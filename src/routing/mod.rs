//! Routing infrastructure
//!
//! The [`Router`] picks a responder for each request, either by keyword
//! classification (`rules`) or by delegating to the planner, and keeps the
//! conversation history consistent around the call.

pub mod classifier;
pub mod router;
pub mod schema;

pub use classifier::KeywordClassifier;
pub use router::Router;
pub use schema::{DomainReplyOutput, PlannerDecisionOutput};
