//! The responder abstraction shared by every domain specialist and the planner

use crate::conversation::ConversationContext;
use crate::llm::provider::LlmError;
use crate::progress::ProgressSender;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Everything a responder sees for one turn
#[derive(Debug, Clone, Copy)]
pub struct TurnInput<'a> {
    pub request_id: Uuid,
    pub text: &'a str,
    /// Read-only view of the conversation so far
    pub context: &'a ConversationContext,
}

impl<'a> TurnInput<'a> {
    pub fn conversation_id(&self) -> &'a str {
        &self.context.conversation_id
    }
}

/// Final answer for a turn and the agent that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponderOutput {
    pub result: String,
    pub agent_name: String,
}

impl ResponderOutput {
    pub fn new(result: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            agent_name: agent_name.into(),
        }
    }
}

/// Responder-side failures
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("{0}")]
    Failed(String),

    /// A responder another one handed the turn to failed
    #[error("{source}")]
    Delegate {
        agent: String,
        #[source]
        source: Box<ResponderError>,
    },
}

impl ResponderError {
    pub fn delegate(agent: impl Into<String>, source: ResponderError) -> Self {
        Self::Delegate {
            agent: agent.into(),
            source: Box::new(source),
        }
    }

    /// Innermost agent the failure belongs to, when it was not the responder called
    pub fn failing_agent(&self) -> Option<&str> {
        match self {
            Self::Delegate { agent, source } => source.failing_agent().or(Some(agent.as_str())),
            _ => None,
        }
    }
}

/// A named capability that answers one request
///
/// Responders are stateless: conversation history arrives through
/// [`TurnInput::context`] and intermediate status goes out through the
/// progress sender.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Agent name attributed to updates and results (e.g. "Billing")
    fn name(&self) -> &str;

    async fn handle(
        &self,
        input: TurnInput<'_>,
        progress: &ProgressSender,
    ) -> Result<ResponderOutput, ResponderError>;
}
