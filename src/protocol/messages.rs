//! Message lifecycle types for the Semker engine
//!
//! This module defines the records the ledger stores (requests and their
//! updates) and the views handed back to polling clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fixed informational text attached to the initial `received` update
pub const RECEIVED_MESSAGE: &str = "Message received and queued for processing.";

/// Processing status of a request
///
/// Serialized lowercase (`received`, `inprogress`, `completed`, `failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Accepted, not yet dispatched
    Received,
    /// A responder is actively working
    InProgress,
    /// Terminal, success
    Completed,
    /// Terminal, error
    Failed,
}

impl MessageStatus {
    /// Whether no further updates may follow this status
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Completed | MessageStatus::Failed)
    }

    /// Check whether moving from `self` to `next` is a legal transition
    ///
    /// `received → inprogress → {completed, failed}`, repeated `inprogress`,
    /// and the direct `received → {completed, failed}` shortcut are allowed.
    /// Nothing leaves a terminal status, and nothing re-enters `received`.
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        !matches!(next, MessageStatus::Received)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Received => "received",
            MessageStatus::InProgress => "inprogress",
            MessageStatus::Completed => "completed",
            MessageStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One submitted unit of work. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub request_id: Uuid,
    pub content: String,
    pub conversation_id: String,
    pub received_at: DateTime<Utc>,
}

impl Request {
    pub fn new(content: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            content: content.into(),
            conversation_id: conversation_id.into(),
            received_at: Utc::now(),
        }
    }
}

/// One timestamped status record belonging to a request
///
/// # Examples
/// ```
/// use semker::protocol::{MessageStatus, Update};
/// use uuid::Uuid;
///
/// let update = Update::new(Uuid::new_v4(), MessageStatus::InProgress)
///     .with_result("Billing Agent response received.")
///     .with_agent("Billing");
/// assert_eq!(update.agent_name.as_deref(), Some("Billing"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Update {
    pub request_id: Uuid,
    pub status: MessageStatus,
    pub processed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

impl Update {
    pub fn new(request_id: Uuid, status: MessageStatus) -> Self {
        Self {
            request_id,
            status,
            processed_at: Utc::now(),
            result: None,
            agent_name: None,
        }
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }
}

/// Returned to the caller of `submit`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitReceipt {
    pub request_id: Uuid,
    pub status: MessageStatus,
    pub received_at: DateTime<Utc>,
}

/// Current status of a request for polling clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusView {
    pub request_id: Uuid,
    pub status: MessageStatus,
    pub content: String,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Summary row in a request listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestSummary {
    pub request_id: Uuid,
    pub status: MessageStatus,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of known requests in insertion order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestList {
    pub total_count: usize,
    pub summaries: Vec<RequestSummary>,
}

/// Inbound submission body used by the HTTP surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitBody {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MessageStatus::InProgress).unwrap(),
            "\"inprogress\""
        );
        assert_eq!(
            serde_json::to_string(&MessageStatus::Received).unwrap(),
            "\"received\""
        );
        let parsed: MessageStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(parsed, MessageStatus::Completed);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!MessageStatus::Received.is_terminal());
        assert!(!MessageStatus::InProgress.is_terminal());
        assert!(MessageStatus::Completed.is_terminal());
        assert!(MessageStatus::Failed.is_terminal());
    }

    #[test]
    fn test_legal_transitions() {
        use MessageStatus::*;

        assert!(Received.can_transition_to(InProgress));
        assert!(Received.can_transition_to(Completed));
        assert!(Received.can_transition_to(Failed));
        assert!(InProgress.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));
    }

    #[test]
    fn test_illegal_transitions() {
        use MessageStatus::*;

        assert!(!InProgress.can_transition_to(Received));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(InProgress));
    }

    #[test]
    fn test_update_omits_empty_optionals() {
        let update = Update::new(Uuid::new_v4(), MessageStatus::Received);
        let json = serde_json::to_string(&update).unwrap();

        assert!(!json.contains("agent_name"));
        assert!(!json.contains("result"));
        assert!(json.contains("processed_at"));
    }

    #[test]
    fn test_request_gets_unique_ids() {
        let a = Request::new("hello", "conv-1");
        let b = Request::new("hello", "conv-1");
        assert_ne!(a.request_id, b.request_id);
    }
}
