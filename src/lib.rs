//! Semker - asynchronous message-lifecycle engine with agent routing
//!
//! A client submits a message within a conversation and gets a request id
//! back at once. The request is answered in the background by one of several
//! domain responders (Billing, Roaming, Tariff, Broadband, Ticket, FAQ),
//! picked by keyword rules or by an LLM planner. Every step is recorded as an
//! update the client can poll.
//!
//! # Components
//!
//! - [`ledger`]: requests and their ordered updates
//! - [`processing`]: background units, deadlines and retention sweeps
//! - [`routing`]: responder selection and dispatch
//! - [`conversation`]: per-conversation turn history
//! - [`agent`]: the responders and their registry
//! - [`transport`]: the warp HTTP surface
//!
//! # Quick Start
//!
//! ```rust
//! use semker::agent::{Domain, ResponderRegistry};
//! use semker::config::SemkerConfig;
//! use semker::testing::mocks::ScriptedResponder;
//! use semker::Engine;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut registry = ResponderRegistry::new();
//! registry.register(
//!     Domain::Billing,
//!     Arc::new(ScriptedResponder::replying("Billing", "Your bill is 42 EUR.")),
//! );
//! let engine = Engine::with_registry(SemkerConfig::test_config(), registry);
//!
//! let receipt = engine
//!     .scheduler
//!     .submit("What is my current bill?", "conv-1")
//!     .unwrap();
//! engine.scheduler.shutdown().await;
//!
//! let updates = engine.ledger.get_updates(receipt.request_id).unwrap();
//! assert_eq!(updates.last().unwrap().agent_name.as_deref(), Some("Billing"));
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod llm;
pub mod observability;
pub mod processing;
pub mod progress;
pub mod protocol;
pub mod routing;
pub mod testing;
pub mod transport;

pub use config::SemkerConfig;
pub use engine::Engine;
pub use error::{SemkerError, SemkerResult};
pub use protocol::*;
