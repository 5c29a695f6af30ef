//! Request routing
//!
//! The [`Router`] turns one request into one responder answer:
//!
//! 1. acquire the conversation (turns of the same conversation queue here),
//! 2. select a responder, by keyword rules or by handing the request to the
//!    planner,
//! 3. run it with a read-only view of the history and the progress sender,
//! 4. record the turn, only when the responder succeeded.
//!
//! Responder failures are returned to the caller untouched apart from being
//! wrapped in [`SemkerError::Responder`]; the router never retries.

use super::classifier::KeywordClassifier;
use crate::agent::{Domain, ResponderKind, ResponderOutput, ResponderRegistry, TurnInput};
use crate::config::{RoutingStrategy, SemkerConfig};
use crate::dispatch_span;
use crate::conversation::{ConversationGuard, ConversationStore, Turn};
use crate::error::{SemkerError, SemkerResult};
use crate::progress::ProgressSender;
use crate::protocol::Request;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

pub struct Router {
    registry: Arc<ResponderRegistry>,
    conversations: Arc<ConversationStore>,
    strategy: RoutingStrategy,
    classifier: KeywordClassifier,
}

impl Router {
    pub fn new(
        registry: Arc<ResponderRegistry>,
        conversations: Arc<ConversationStore>,
        strategy: RoutingStrategy,
    ) -> Self {
        let classifier = KeywordClassifier::new(&registry.domains());
        Self {
            registry,
            conversations,
            strategy,
            classifier,
        }
    }

    /// Router using the configured strategy and keyword extensions
    pub fn from_config(
        config: &SemkerConfig,
        registry: Arc<ResponderRegistry>,
        conversations: Arc<ConversationStore>,
    ) -> Self {
        let classifier = KeywordClassifier::from_config(&registry.domains(), config);
        Self {
            registry,
            conversations,
            strategy: config.routing.strategy,
            classifier,
        }
    }

    pub fn strategy(&self) -> RoutingStrategy {
        self.strategy
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    /// Choose the responder for `text`
    pub fn select(&self, text: &str) -> SemkerResult<ResponderKind> {
        if self.strategy == RoutingStrategy::Planner {
            if let Some(planner) = self.registry.planner() {
                return Ok(planner);
            }
            warn!("Planner strategy configured without a planner; using keyword rules");
        }

        let domain = self.classifier.classify(text);
        self.registry
            .domain(domain)
            .or_else(|| self.registry.domain(Domain::Faq))
            .ok_or_else(|| {
                SemkerError::internal(format!("No responder registered for {domain}"))
            })
    }

    /// Answer one request within its conversation
    pub async fn dispatch(
        &self,
        request: &Request,
        progress: &ProgressSender,
    ) -> SemkerResult<ResponderOutput> {
        let conversation = self.acquire(&request.conversation_id).await;
        self.dispatch_in(conversation, request, progress).await
    }

    /// Wait for exclusive use of a conversation
    pub async fn acquire(&self, conversation_id: &str) -> ConversationGuard {
        self.conversations.get_or_create(conversation_id).await
    }

    /// Answer one request with its conversation already held
    pub async fn dispatch_in(
        &self,
        mut conversation: ConversationGuard,
        request: &Request,
        progress: &ProgressSender,
    ) -> SemkerResult<ResponderOutput> {
        let responder = self.select(&request.content)?;
        debug!(
            request_id = %request.request_id,
            conversation_id = %request.conversation_id,
            responder = ?responder,
            history_turns = conversation.turns.len(),
            "Dispatching request"
        );

        let input = TurnInput {
            request_id: request.request_id,
            text: &request.content,
            context: &conversation,
        };

        let output = responder
            .handle(input, progress)
            .instrument(dispatch_span!(agent_name = %responder.name()))
            .await
            .map_err(|e| {
                let agent = e.failing_agent().unwrap_or(responder.name());
                SemkerError::responder(agent, e.to_string())
            })?;

        self.conversations.update(
            &mut conversation,
            Turn::new(&request.content, &output.result, &output.agent_name),
        );

        info!(
            request_id = %request.request_id,
            conversation_id = %request.conversation_id,
            agent_name = %output.agent_name,
            "Request answered"
        );

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Responder;
    use crate::progress::progress_channel;
    use crate::testing::mocks::{MockLlmProvider, ScriptedResponder};

    fn registry_with(responders: Vec<(Domain, ScriptedResponder)>) -> ResponderRegistry {
        let mut registry = ResponderRegistry::new();
        for (domain, responder) in responders {
            registry.register(domain, Arc::new(responder) as Arc<dyn Responder>);
        }
        registry
    }

    fn rules_router(registry: ResponderRegistry) -> Router {
        Router::new(
            Arc::new(registry),
            Arc::new(ConversationStore::default()),
            RoutingStrategy::Rules,
        )
    }

    #[tokio::test]
    async fn test_rules_dispatch_records_turn() {
        let billing = ScriptedResponder::replying("Billing", "Your bill is 42 EUR.");
        let router = rules_router(registry_with(vec![
            (Domain::Billing, billing.clone()),
            (Domain::Faq, ScriptedResponder::replying("Faq", "Hi")),
        ]));
        let request = Request::new("What is my current bill?", "conv-1");

        let output = router
            .dispatch(&request, &ProgressSender::detached())
            .await
            .unwrap();

        assert_eq!(output.agent_name, "Billing");
        let context = router.conversations().snapshot("conv-1").await.unwrap();
        assert_eq!(context.turns.len(), 1);
        assert_eq!(context.turns[0].user, "What is my current bill?");
        assert_eq!(context.turns[0].assistant, "Your bill is 42 EUR.");
    }

    #[tokio::test]
    async fn test_failed_turn_is_not_recorded() {
        let router = rules_router(registry_with(vec![(
            Domain::Faq,
            ScriptedResponder::failing("Faq", "model unavailable"),
        )]));
        let request = Request::new("hello", "conv-1");

        let result = router.dispatch(&request, &ProgressSender::detached()).await;

        match result {
            Err(SemkerError::Responder { agent, message }) => {
                assert_eq!(agent, "Faq");
                assert_eq!(message, "model unavailable");
            }
            other => panic!("expected responder error, got {other:?}"),
        }
        let context = router.conversations().snapshot("conv-1").await.unwrap();
        assert!(context.turns.is_empty());
    }

    #[tokio::test]
    async fn test_history_is_passed_to_next_turn() {
        let faq = ScriptedResponder::replying("Faq", "ok");
        let router = rules_router(registry_with(vec![(Domain::Faq, faq.clone())]));

        for text in ["first", "second"] {
            router
                .dispatch(&Request::new(text, "conv-1"), &ProgressSender::detached())
                .await
                .unwrap();
        }

        let calls = faq.observed_calls().await;
        assert_eq!(calls[0].history_len, 0);
        assert_eq!(calls[1].history_len, 1);
    }

    #[tokio::test]
    async fn test_unregistered_domain_falls_back_to_faq() {
        let router = rules_router(registry_with(vec![(
            Domain::Faq,
            ScriptedResponder::replying("Faq", "general answer"),
        )]));

        let output = router
            .dispatch(
                &Request::new("What is my current bill?", "conv-1"),
                &ProgressSender::detached(),
            )
            .await
            .unwrap();
        assert_eq!(output.agent_name, "Faq");
    }

    #[tokio::test]
    async fn test_empty_registry_is_internal_error() {
        let router = rules_router(ResponderRegistry::new());

        let result = router
            .dispatch(&Request::new("hello", "conv-1"), &ProgressSender::detached())
            .await;
        assert!(matches!(result, Err(SemkerError::Internal { .. })));
    }

    #[tokio::test]
    async fn test_planner_strategy_forwards_progress_in_order() {
        let billing = ScriptedResponder::replying("Billing", "42 EUR")
            .with_progress(&["Billing Agent response received."]);
        let provider = Arc::new(MockLlmProvider::single_response(
            r#"{"reply": "", "agent_name": "Billing"}"#,
        ));
        let registry = registry_with(vec![(Domain::Billing, billing)]).with_planner(
            provider,
            "gpt-4o-mini",
            0.0,
        );
        let router = Router::new(
            Arc::new(registry),
            Arc::new(ConversationStore::default()),
            RoutingStrategy::Planner,
        );
        let (sender, mut receiver) = progress_channel();

        let output = router
            .dispatch(&Request::new("What is my current bill?", "conv-1"), &sender)
            .await
            .unwrap();
        drop(sender);

        assert_eq!(output.agent_name, "Billing");
        let mut messages = Vec::new();
        while let Some(event) = receiver.recv().await {
            messages.push(event.message);
        }
        assert_eq!(
            messages,
            vec![
                "Planner agent response received.",
                "Planner agent routing to Billing agent.",
                "Billing Agent response received.",
            ]
        );
    }

    #[test]
    fn test_planner_strategy_without_planner_uses_rules() {
        let router = Router::new(
            Arc::new(registry_with(vec![(
                Domain::Faq,
                ScriptedResponder::replying("Faq", "x"),
            )])),
            Arc::new(ConversationStore::default()),
            RoutingStrategy::Planner,
        );

        let selected = router.select("anything").unwrap();
        assert_eq!(selected.name(), "Faq");
    }
}
