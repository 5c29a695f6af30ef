//! Domain specialists
//!
//! Each [`Domain`] is answered by an LLM-backed [`DomainResponder`] primed
//! with that domain's instructions. The optional tool endpoint configured for
//! the domain travels with the completion request together with the
//! correlation ids of the request being answered.

use super::responder::{Responder, ResponderError, ResponderOutput, TurnInput};
use crate::llm::provider::{CompletionRequest, LlmProvider, Message};
use crate::progress::ProgressSender;
use crate::routing::schema::DomainReplyOutput;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Header carrying the request id to tool back-ends
pub const MESSAGE_ID_HEADER: &str = "x-ms-message-id";
/// Header carrying the conversation id to tool back-ends
pub const CONVERSATION_ID_HEADER: &str = "x-ms-conversation-id";
/// Metadata key for the domain's tool endpoint
pub const TOOL_ENDPOINT_KEY: &str = "tool_endpoint";

/// The specialist domains known to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Billing,
    Roaming,
    Tariff,
    Broadband,
    Ticket,
    Faq,
}

impl Domain {
    pub const ALL: [Domain; 6] = [
        Domain::Billing,
        Domain::Roaming,
        Domain::Tariff,
        Domain::Broadband,
        Domain::Ticket,
        Domain::Faq,
    ];

    /// Parse a config key or agent name, case-insensitively
    pub fn parse(value: &str) -> Option<Domain> {
        let value = value.trim();
        Self::ALL.into_iter().find(|domain| {
            domain.key().eq_ignore_ascii_case(value)
                || domain.display_name().eq_ignore_ascii_case(value)
        })
    }

    /// Lowercase key used in configuration
    pub fn key(self) -> &'static str {
        match self {
            Domain::Billing => "billing",
            Domain::Roaming => "roaming",
            Domain::Tariff => "tariff",
            Domain::Broadband => "broadband",
            Domain::Ticket => "ticket",
            Domain::Faq => "faq",
        }
    }

    /// Agent name attributed to updates
    pub fn display_name(self) -> &'static str {
        match self {
            Domain::Billing => "Billing",
            Domain::Roaming => "Roaming",
            Domain::Tariff => "Tariff",
            Domain::Broadband => "Broadband",
            Domain::Ticket => "Ticket",
            Domain::Faq => "Faq",
        }
    }

    /// Built-in classification vocabulary
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Domain::Billing => &[
                "bill",
                "billing",
                "invoice",
                "payment",
                "charge",
                "charges",
                "balance",
                "refund",
                "statement",
                "overcharged",
            ],
            Domain::Roaming => &[
                "roaming",
                "abroad",
                "travel",
                "travelling",
                "traveling",
                "international",
                "overseas",
                "country",
            ],
            Domain::Tariff => &[
                "tariff",
                "tariffs",
                "plan",
                "plans",
                "upgrade",
                "downgrade",
                "package",
                "bundle",
                "subscription",
            ],
            Domain::Broadband => &[
                "broadband",
                "internet",
                "wifi",
                "router",
                "fiber",
                "fibre",
                "speed",
                "outage",
            ],
            Domain::Ticket => &[
                "ticket",
                "complaint",
                "escalate",
                "incident",
                "technician",
                "open a case",
            ],
            Domain::Faq => &["faq", "hours", "store", "contact", "how do i"],
        }
    }

    /// System instructions for this specialist
    pub fn instructions(self) -> &'static str {
        match self {
            Domain::Billing => {
                "You are the Billing agent of a telecom operator. Answer questions about bills, \
                 invoices, payments and charges. Only state figures obtained from the billing \
                 tools. If the data is unavailable say so plainly. Never reveal personal or \
                 sensitive account data."
            }
            Domain::Roaming => {
                "You are the Roaming agent of a telecom operator. Answer questions about standard \
                 roaming rates for voice, SMS and data per country and month. Only present rates \
                 returned by the roaming tools and never guess or interpolate prices."
            }
            Domain::Tariff => {
                "You are the Tariff agent of a telecom operator. Explain available tariff plans, \
                 bundles and upgrade options using only the plan catalogue returned by the \
                 tariff tools."
            }
            Domain::Broadband => {
                "You are the Broadband agent of a telecom operator. Help with home internet \
                 availability, speeds and known outages using the broadband tools."
            }
            Domain::Ticket => {
                "You are the Ticketing agent of a telecom operator. Open, update and report on \
                 support tickets using the ticketing tools. Ask for any missing detail needed \
                 to file the ticket."
            }
            Domain::Faq => {
                "You are the general help agent of a telecom operator. Answer frequently asked \
                 questions concisely. When a question needs account data you do not have, say \
                 which specialist can help."
            }
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Instruction appended to every specialist prompt
const REPLY_FORMAT_INSTRUCTION: &str = "Respond with a JSON object containing `reply` (your \
     answer to the user) and `human_input_required` (true when you need more information).";

/// LLM-backed specialist for one domain
pub struct DomainResponder {
    domain: Domain,
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    endpoint: Option<String>,
}

impl DomainResponder {
    pub fn new(domain: Domain, provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            domain,
            provider,
            model: model.into(),
            temperature: Some(0.0),
            max_tokens: None,
            endpoint: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Tool endpoint (MCP server) backing this domain
    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Build the completion request for one turn (pure function)
    pub fn build_request(&self, input: &TurnInput<'_>) -> CompletionRequest {
        let mut messages = Vec::with_capacity(input.context.turns.len() * 2 + 2);
        messages.push(Message::system(format!(
            "{}\n\n{}",
            self.domain.instructions(),
            REPLY_FORMAT_INSTRUCTION
        )));
        for turn in &input.context.turns {
            messages.push(Message::user(turn.user.clone()));
            messages.push(Message::assistant(turn.assistant.clone()));
        }
        messages.push(Message::user(input.text));

        let mut metadata = HashMap::from([
            (MESSAGE_ID_HEADER.to_string(), input.request_id.to_string()),
            (
                CONVERSATION_ID_HEADER.to_string(),
                input.conversation_id().to_string(),
            ),
        ]);
        if let Some(endpoint) = &self.endpoint {
            metadata.insert(TOOL_ENDPOINT_KEY.to_string(), endpoint.clone());
        }

        CompletionRequest {
            messages,
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            response_format: Some(DomainReplyOutput::response_format()),
            metadata,
        }
    }
}

#[async_trait]
impl Responder for DomainResponder {
    fn name(&self) -> &str {
        self.domain.display_name()
    }

    async fn handle(
        &self,
        input: TurnInput<'_>,
        progress: &ProgressSender,
    ) -> Result<ResponderOutput, ResponderError> {
        let request = self.build_request(&input);
        debug!(
            agent_name = self.name(),
            request_id = %input.request_id,
            history_turns = input.context.turns.len(),
            "Calling model for domain reply"
        );

        let response = self.provider.complete(request).await?;

        progress.report(format!("{} Agent response received.", self.name()), self.name());

        let content = response.content.unwrap_or_default();
        let reply = DomainReplyOutput::parse_lenient(&content).ok_or_else(|| {
            warn!(agent_name = self.name(), "Model returned an empty reply");
            ResponderError::MalformedOutput(format!("{} returned an empty reply", self.name()))
        })?;

        info!(
            agent_name = self.name(),
            request_id = %input.request_id,
            human_input_required = reply.human_input_required,
            "Domain reply produced"
        );

        Ok(ResponderOutput::new(reply.reply, self.name()))
    }
}
