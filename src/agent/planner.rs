//! Planner responder
//!
//! Asks the model which specialist should answer, then either delegates to
//! that specialist or answers directly. The planner holds shared references
//! to the domain responders it may delegate to.

use super::domain::Domain;
use super::responder::{Responder, ResponderError, ResponderOutput, TurnInput};
use crate::llm::provider::{CompletionRequest, LlmProvider, Message};
use crate::progress::ProgressSender;
use crate::routing::schema::PlannerDecisionOutput;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Agent name used for planner attribution
pub const PLANNER_AGENT_NAME: &str = "Planner";

/// Routes a request to a specialist chosen by the model
pub struct PlannerResponder {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f32,
    delegates: BTreeMap<Domain, Arc<dyn Responder>>,
}

impl PlannerResponder {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        delegates: BTreeMap<Domain, Arc<dyn Responder>>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            delegates,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Same model settings over a different set of delegates
    pub fn with_delegates(&self, delegates: BTreeMap<Domain, Arc<dyn Responder>>) -> Self {
        Self {
            provider: self.provider.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            delegates,
        }
    }

    pub fn delegates(&self) -> impl Iterator<Item = Domain> + '_ {
        self.delegates.keys().copied()
    }

    /// System prompt listing the specialists that can take the request
    fn instructions(&self) -> String {
        let mut prompt = String::from(
            "You are the Planner of a telecom customer assistant. Decide which specialist \
             agent should answer the user's latest message.\n\nAVAILABLE AGENTS:\n",
        );
        for domain in self.delegates.keys() {
            prompt.push_str(&format!("- {}\n", domain.display_name()));
        }
        prompt.push_str(
            "\nRespond with a JSON object containing `agent_name` (one of the agents above, \
             or \"Planner\" when none of them fits) and `reply` (your own answer, used only \
             when you pick \"Planner\").",
        );
        prompt
    }

    fn build_request(&self, input: &TurnInput<'_>) -> CompletionRequest {
        let mut messages = vec![Message::system(self.instructions())];
        for turn in &input.context.turns {
            messages.push(Message::user(turn.user.clone()));
            messages.push(Message::assistant(turn.assistant.clone()));
        }
        messages.push(Message::user(input.text));

        CompletionRequest {
            messages,
            model: self.model.clone(),
            max_tokens: Some(500),
            temperature: Some(self.temperature),
            response_format: Some(PlannerDecisionOutput::response_format()),
            metadata: Default::default(),
        }
    }

    /// Map the decision onto a registered delegate (pure function)
    fn resolve_delegate(&self, decision: &PlannerDecisionOutput) -> Option<&Arc<dyn Responder>> {
        Domain::parse(&decision.agent_name).and_then(|domain| self.delegates.get(&domain))
    }
}

#[async_trait]
impl Responder for PlannerResponder {
    fn name(&self) -> &str {
        PLANNER_AGENT_NAME
    }

    async fn handle(
        &self,
        input: TurnInput<'_>,
        progress: &ProgressSender,
    ) -> Result<ResponderOutput, ResponderError> {
        let request = self.build_request(&input);
        let response = self.provider.complete(request).await?;

        let content = response.content.ok_or_else(|| {
            ResponderError::MalformedOutput("No content in planner response".to_string())
        })?;

        let decision = PlannerDecisionOutput::parse(&content).map_err(|e| {
            warn!(error = %e, response = %content, "Failed to parse planner decision");
            ResponderError::MalformedOutput(e)
        })?;

        progress.report("Planner agent response received.", PLANNER_AGENT_NAME);

        match self.resolve_delegate(&decision) {
            Some(delegate) => {
                info!(
                    request_id = %input.request_id,
                    agent_name = %delegate.name(),
                    "Planner delegating request"
                );
                progress.report(
                    format!("Planner agent routing to {} agent.", delegate.name()),
                    PLANNER_AGENT_NAME,
                );
                delegate
                    .handle(input, progress)
                    .await
                    .map_err(|e| ResponderError::delegate(delegate.name(), e))
            }
            None => {
                debug!(
                    request_id = %input.request_id,
                    requested = %decision.agent_name,
                    "Planner answering directly"
                );
                Ok(ResponderOutput::new(decision.reply, PLANNER_AGENT_NAME))
            }
        }
    }
}
