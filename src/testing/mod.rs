//! Testing utilities and mock implementations
//!
//! Scripted providers and responders for exercising the engine without a
//! model endpoint.

pub mod mocks;

pub use mocks::*;
