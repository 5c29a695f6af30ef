//! Mock implementations for testing
//!
//! Provides a scripted LLM provider and scripted responders so the scheduler,
//! router and HTTP surface can be exercised without a model endpoint.

use crate::agent::responder::{Responder, ResponderError, ResponderOutput, TurnInput};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
};
use crate::progress::ProgressSender;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Mock LLM provider for testing
///
/// Returns the scripted responses in order, cycling when exhausted, and
/// records every request it receives.
#[derive(Debug, Default)]
pub struct MockLlmProvider {
    pub responses: Vec<String>,
    pub current_response: Arc<Mutex<usize>>,
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
    pub failure: Option<String>,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            ..Default::default()
        }
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    pub async fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn available_models(&self) -> Vec<String> {
        vec!["mock-model".to_string()]
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().await.push(request.clone());

        if let Some(message) = &self.failure {
            return Err(LlmError::RequestFailed(message.clone()));
        }

        let mut current = self.current_response.lock().await;
        let response_idx = *current % self.responses.len().max(1);
        *current += 1;

        let content = self
            .responses
            .get(response_idx)
            .cloned()
            .unwrap_or_else(|| "Mock response".to_string());

        Ok(CompletionResponse {
            content: Some(content),
            model: "mock-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: FinishReason::Stop,
            metadata: request.metadata,
        })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        match &self.failure {
            Some(message) => Err(LlmError::RequestFailed(message.clone())),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
enum Behavior {
    Reply(String),
    Fail(String),
    Panic,
}

/// One observed invocation of a [`ScriptedResponder`]
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedCall {
    pub text: String,
    pub conversation_id: String,
    pub history_len: usize,
}

/// Responder with a fixed script: optional progress events, an optional
/// delay, then a reply, an error or a panic
#[derive(Debug, Clone)]
pub struct ScriptedResponder {
    name: String,
    progress: Vec<String>,
    delay: Option<Duration>,
    behavior: Behavior,
    pub calls: Arc<Mutex<Vec<ObservedCall>>>,
}

impl ScriptedResponder {
    pub fn replying(name: impl Into<String>, reply: impl Into<String>) -> Self {
        Self::with_behavior(name, Behavior::Reply(reply.into()))
    }

    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_behavior(name, Behavior::Fail(message.into()))
    }

    pub fn panicking(name: impl Into<String>) -> Self {
        Self::with_behavior(name, Behavior::Panic)
    }

    fn with_behavior(name: impl Into<String>, behavior: Behavior) -> Self {
        Self {
            name: name.into(),
            progress: Vec::new(),
            delay: None,
            behavior,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_progress(mut self, messages: &[&str]) -> Self {
        self.progress = messages.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn observed_calls(&self) -> Vec<ObservedCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        input: TurnInput<'_>,
        progress: &ProgressSender,
    ) -> Result<ResponderOutput, ResponderError> {
        self.calls.lock().await.push(ObservedCall {
            text: input.text.to_string(),
            conversation_id: input.conversation_id().to_string(),
            history_len: input.context.turns.len(),
        });

        for message in &self.progress {
            progress.report(message.clone(), &self.name);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            Behavior::Reply(reply) => Ok(ResponderOutput::new(reply.clone(), self.name.clone())),
            Behavior::Fail(message) => Err(ResponderError::Failed(message.clone())),
            Behavior::Panic => panic!("scripted responder {} panicked", self.name),
        }
    }
}
