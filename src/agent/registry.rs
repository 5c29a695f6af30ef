//! Responder Registry
//!
//! The fixed set of responders assembled at startup. Domain specialists and
//! the planner share the [`Responder`] trait; [`ResponderKind`] tags which
//! one a routing decision picked.

use super::domain::{Domain, DomainResponder};
use super::planner::PlannerResponder;
use super::responder::{Responder, ResponderError, ResponderOutput, TurnInput};
use crate::config::SemkerConfig;
use crate::llm::provider::LlmProvider;
use crate::progress::ProgressSender;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// A responder selected for one turn
#[derive(Clone)]
pub enum ResponderKind {
    Domain {
        domain: Domain,
        responder: Arc<dyn Responder>,
    },
    Planner(Arc<PlannerResponder>),
}

impl ResponderKind {
    pub fn name(&self) -> &str {
        match self {
            ResponderKind::Domain { responder, .. } => responder.name(),
            ResponderKind::Planner(planner) => planner.name(),
        }
    }

    pub async fn handle(
        &self,
        input: TurnInput<'_>,
        progress: &ProgressSender,
    ) -> Result<ResponderOutput, ResponderError> {
        match self {
            ResponderKind::Domain { responder, .. } => responder.handle(input, progress).await,
            ResponderKind::Planner(planner) => planner.handle(input, progress).await,
        }
    }
}

impl std::fmt::Debug for ResponderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponderKind::Domain { domain, .. } => f.debug_tuple("Domain").field(domain).finish(),
            ResponderKind::Planner(_) => f.write_str("Planner"),
        }
    }
}

/// Responders available to the router
#[derive(Default)]
pub struct ResponderRegistry {
    domains: BTreeMap<Domain, Arc<dyn Responder>>,
    planner: Option<Arc<PlannerResponder>>,
}

impl ResponderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build LLM-backed responders for every enabled domain plus the planner
    pub fn from_config(config: &SemkerConfig, provider: Arc<dyn LlmProvider>) -> Self {
        let mut registry = Self::new();

        for domain in Domain::ALL {
            let section = config.responder(domain);
            if section.disabled {
                info!(agent_name = domain.display_name(), "Responder disabled by configuration");
                continue;
            }

            let responder = DomainResponder::new(domain, provider.clone(), &config.llm.model)
                .with_temperature(config.llm.temperature.or(Some(0.0)))
                .with_max_tokens(config.llm.max_tokens)
                .with_endpoint(section.endpoint);
            registry.register(domain, Arc::new(responder));
        }

        registry.with_planner(
            provider,
            &config.llm.model,
            config.routing.planner_temperature,
        )
    }

    /// Register (or replace) the responder for a domain
    ///
    /// An attached planner is rebuilt so it can delegate to the new responder.
    pub fn register(&mut self, domain: Domain, responder: Arc<dyn Responder>) {
        self.domains.insert(domain, responder);
        if let Some(planner) = &self.planner {
            self.planner = Some(Arc::new(planner.with_delegates(self.domains.clone())));
        }
    }

    /// Attach a planner that may delegate to every registered domain
    pub fn with_planner(
        mut self,
        provider: Arc<dyn LlmProvider>,
        model: &str,
        temperature: f32,
    ) -> Self {
        let planner = PlannerResponder::new(provider, model, self.domains.clone())
            .with_temperature(temperature);
        self.planner = Some(Arc::new(planner));
        self
    }

    pub fn domain(&self, domain: Domain) -> Option<ResponderKind> {
        self.domains
            .get(&domain)
            .map(|responder| ResponderKind::Domain {
                domain,
                responder: responder.clone(),
            })
    }

    pub fn planner(&self) -> Option<ResponderKind> {
        self.planner.clone().map(ResponderKind::Planner)
    }

    /// Registered domains in declaration order
    pub fn domains(&self) -> Vec<Domain> {
        self.domains.keys().copied().collect()
    }

    pub fn has_planner(&self) -> bool {
        self.planner.is_some()
    }

    pub fn len(&self) -> usize {
        self.domains.len() + usize::from(self.planner.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{MockLlmProvider, ScriptedResponder};

    #[test]
    fn test_from_config_registers_all_domains_and_planner() {
        let config = SemkerConfig::test_config();
        let registry = ResponderRegistry::from_config(&config, Arc::new(MockLlmProvider::default()));

        assert_eq!(registry.domains(), Domain::ALL.to_vec());
        assert!(registry.has_planner());
        assert_eq!(registry.len(), 7);
        assert_eq!(registry.planner().unwrap().name(), "Planner");
        assert_eq!(registry.domain(Domain::Roaming).unwrap().name(), "Roaming");
    }

    #[test]
    fn test_disabled_domain_is_skipped() {
        let config = SemkerConfig::from_toml_str(
            r#"
            [llm]
            provider = "openai"
            model = "gpt-4o-mini"
            api_key_env = "OPENAI_API_KEY"

            [responders.ticket]
            disabled = true
            "#,
        )
        .unwrap();
        let registry = ResponderRegistry::from_config(&config, Arc::new(MockLlmProvider::default()));

        assert!(registry.domain(Domain::Ticket).is_none());
        assert!(registry.domain(Domain::Faq).is_some());
    }

    #[test]
    fn test_register_after_planner_is_delegable() {
        let mut registry = ResponderRegistry::new();
        registry.register(
            Domain::Billing,
            Arc::new(ScriptedResponder::replying("Billing", "ok")),
        );
        let mut registry =
            registry.with_planner(Arc::new(MockLlmProvider::default()), "gpt-4o-mini", 0.0);
        registry.register(
            Domain::Roaming,
            Arc::new(ScriptedResponder::replying("Roaming", "ok")),
        );

        let Some(ResponderKind::Planner(planner)) = registry.planner() else {
            panic!("planner missing");
        };
        assert_eq!(
            planner.delegates().collect::<Vec<_>>(),
            vec![Domain::Billing, Domain::Roaming]
        );
    }

    #[test]
    fn test_register_replaces_domain() {
        let mut registry = ResponderRegistry::new();
        registry.register(
            Domain::Faq,
            Arc::new(ScriptedResponder::replying("Faq", "first")),
        );
        registry.register(
            Domain::Faq,
            Arc::new(ScriptedResponder::replying("Faq", "second")),
        );

        assert_eq!(registry.domains(), vec![Domain::Faq]);
        assert!(!registry.has_planner());
        assert!(registry.planner().is_none());
    }
}
