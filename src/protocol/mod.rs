//! Request and update types shared by the ledger, scheduler and HTTP surface
//!
//! This module implements the core message structures exchanged between
//! submitters, the processing engine and polling clients.

pub mod messages;

pub use messages::*;
