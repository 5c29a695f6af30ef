//! LLM provider abstraction layer
//!
//! Responders depend on [`LlmProvider`]; the concrete OpenAI/Azure client
//! lives under `providers`.

pub mod provider;
pub mod providers;

pub use provider::*;
pub use providers::*;
