//! Intermediate progress reporting
//!
//! Responders emit [`ProgressEvent`]s on an unbounded channel while they
//! work. The scheduler owns the receiving half and drains it into the ledger
//! through a [`LedgerProgressReporter`], so events land as `inprogress`
//! updates in exactly the order they were emitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

pub mod ledger_reporter;
pub use ledger_reporter::LedgerProgressReporter;

/// One intermediate status message from a responder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub message: String,
    pub agent_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(message: impl Into<String>, agent_name: Option<String>) -> Self {
        Self {
            message: message.into(),
            agent_name,
            timestamp: Utc::now(),
        }
    }
}

/// Sending half handed to responders
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

/// Receiving half drained by the scheduler
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Create a connected sender/receiver pair
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, rx)
}

impl ProgressSender {
    /// A sender whose events go nowhere
    pub fn detached() -> Self {
        progress_channel().0
    }

    /// Emit a progress event attributed to `agent_name`
    ///
    /// Never blocks. Events sent after the request was finalized are dropped.
    pub fn report(&self, message: impl Into<String>, agent_name: &str) {
        let event = ProgressEvent::new(message, Some(agent_name.to_string()));
        trace!(agent_name, message = %event.message, "Progress event");
        let _ = self.tx.send(event);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
