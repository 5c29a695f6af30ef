//! Responders for the Semker engine
//!
//! Domain specialists, the planner that delegates between them, and the
//! registry the router selects from.

pub mod domain;
pub mod planner;
pub mod registry;
pub mod responder;

pub use domain::{Domain, DomainResponder};
pub use planner::{PlannerResponder, PLANNER_AGENT_NAME};
pub use registry::{ResponderKind, ResponderRegistry};
pub use responder::{Responder, ResponderError, ResponderOutput, TurnInput};
