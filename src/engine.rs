//! Engine assembly
//!
//! Wires the stores, responders, router and scheduler together once at
//! startup. Everything is shared through `Arc`; nothing here is global.

use crate::agent::ResponderRegistry;
use crate::config::SemkerConfig;
use crate::conversation::ConversationStore;
use crate::error::SemkerResult;
use crate::ledger::MessageLedger;
use crate::llm::provider::LlmProvider;
use crate::llm::providers::{OpenAiConfig, OpenAiProvider};
use crate::processing::{spawn_retention_sweeper, ProcessingScheduler};
use crate::routing::Router;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

pub struct Engine {
    pub config: SemkerConfig,
    pub ledger: Arc<MessageLedger>,
    pub conversations: Arc<ConversationStore>,
    pub router: Arc<Router>,
    pub scheduler: Arc<ProcessingScheduler>,
}

impl Engine {
    /// Assemble around an explicit registry
    pub fn with_registry(config: SemkerConfig, registry: ResponderRegistry) -> Self {
        let ledger = Arc::new(MessageLedger::new());
        let conversations = Arc::new(ConversationStore::new(
            config.retention.max_turns_per_conversation,
        ));
        let router = Arc::new(Router::from_config(
            &config,
            Arc::new(registry),
            conversations.clone(),
        ));
        let scheduler = Arc::new(ProcessingScheduler::from_config(
            &config,
            ledger.clone(),
            router.clone(),
        ));

        Self {
            config,
            ledger,
            conversations,
            router,
            scheduler,
        }
    }

    /// Assemble with LLM-backed responders sharing `provider`
    pub fn with_provider(config: SemkerConfig, provider: Arc<dyn LlmProvider>) -> Self {
        let registry = ResponderRegistry::from_config(&config, provider);
        info!(
            responders = registry.len(),
            strategy = ?config.routing.strategy,
            "Responder registry assembled"
        );
        Self::with_registry(config, registry)
    }

    /// Assemble with the provider named in `[llm]`
    ///
    /// Reads the API key from the environment variable the config names.
    pub fn from_config(config: SemkerConfig) -> SemkerResult<Self> {
        let api_key = config.get_llm_api_key()?;
        let provider = OpenAiProvider::new(OpenAiConfig::from_section(&config.llm, api_key)?)?;
        Ok(Self::with_provider(config, Arc::new(provider)))
    }

    /// Start the retention sweeper, if any sweep is enabled
    pub fn spawn_retention(&self) -> Option<JoinHandle<()>> {
        spawn_retention_sweeper(
            self.ledger.clone(),
            self.conversations.clone(),
            self.config.retention.clone(),
        )
    }
}
