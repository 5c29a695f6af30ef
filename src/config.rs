//! Configuration system for the Semker message engine
//!
//! Configuration is read from a TOML file. Every section except `[llm]` has
//! defaults, so a minimal file only names the model provider. Secrets are
//! never stored in the file: `api_key_env` names the environment variable
//! resolved at runtime.

use crate::agent::Domain;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main engine configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemkerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub processing: ProcessingSection,
    #[serde(default)]
    pub retention: RetentionSection,
    pub llm: LlmSection,
    #[serde(default)]
    pub routing: RoutingSection,
    /// Per-domain responder settings keyed by domain name (`billing`, `roaming`, ...)
    #[serde(default)]
    pub responders: HashMap<String, ResponderSection>,
}

/// HTTP surface settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Longest accepted message content, in characters
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_message_length: default_max_message_length(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_message_length() -> usize {
    10_000
}

/// Background processing settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingSection {
    /// Deadline per request in seconds; 0 disables the deadline
    #[serde(default)]
    pub timeout_secs: u64,
    /// Maximum number of requests dispatched to responders at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for ProcessingSection {
    fn default() -> Self {
        Self {
            timeout_secs: 0,
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl ProcessingSection {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

fn default_max_concurrent() -> usize {
    64
}

/// Retention policy for finished requests and idle conversations
///
/// Ages of 0 disable the corresponding sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetentionSection {
    #[serde(default)]
    pub request_ttl_secs: u64,
    #[serde(default)]
    pub conversation_idle_secs: u64,
    #[serde(default = "default_max_turns")]
    pub max_turns_per_conversation: usize,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            request_ttl_secs: 0,
            conversation_idle_secs: 0,
            max_turns_per_conversation: default_max_turns(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl RetentionSection {
    pub fn sweeps_enabled(&self) -> bool {
        self.request_ttl_secs > 0 || self.conversation_idle_secs > 0
    }
}

fn default_max_turns() -> usize {
    50
}

fn default_sweep_interval() -> u64 {
    60
}

/// LLM section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    /// Provider name ("openai" or "azure")
    pub provider: String,
    /// Model identifier (deployment name for Azure)
    pub model: String,
    /// Environment variable containing API key
    pub api_key_env: String,
    /// Override for the API base URL
    pub base_url: Option<String>,
    /// Azure `api-version` query parameter
    pub api_version: Option<String>,
    /// Optional temperature (0.0 to 2.0)
    pub temperature: Option<f32>,
    /// Optional max tokens
    pub max_tokens: Option<u32>,
    /// HTTP timeout for a single completion call
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_timeout() -> u64 {
    60
}

/// Routing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingSection {
    #[serde(default)]
    pub strategy: RoutingStrategy,
    /// Temperature for planner decisions (default: 0.0)
    #[serde(default)]
    pub planner_temperature: f32,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategy::default(),
            planner_temperature: 0.0,
        }
    }
}

/// Routing strategy selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoutingStrategy {
    /// Keyword classification against each domain's vocabulary
    Rules,
    /// Delegate the decision to the planner responder
    #[default]
    Planner,
}

/// Per-domain responder settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponderSection {
    /// External tool endpoint (MCP server) backing this domain
    pub endpoint: Option<String>,
    /// Extra classification keywords, appended to the built-in vocabulary
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Disable this responder entirely
    #[serde(default)]
    pub disabled: bool,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl { field: String, reason: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SemkerConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SemkerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.llm.provider.as_str() {
            "openai" | "azure" => {}
            other => {
                return Err(ConfigError::InvalidConfig(format!(
                    "Unsupported LLM provider: {other}"
                )))
            }
        }

        if self.llm.provider == "azure" {
            if self.llm.base_url.is_none() {
                return Err(ConfigError::InvalidConfig(
                    "Azure provider requires llm.base_url".to_string(),
                ));
            }
            if self.llm.api_version.is_none() {
                return Err(ConfigError::InvalidConfig(
                    "Azure provider requires llm.api_version".to_string(),
                ));
            }
        }

        if let Some(base_url) = &self.llm.base_url {
            validate_url("llm.base_url", base_url)?;
        }

        if let Some(temperature) = self.llm.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::InvalidConfig(format!(
                    "llm.temperature must be between 0.0 and 2.0, got {temperature}"
                )));
            }
        }

        if self.processing.max_concurrent == 0 {
            return Err(ConfigError::InvalidConfig(
                "processing.max_concurrent must be at least 1".to_string(),
            ));
        }

        if self.retention.max_turns_per_conversation == 0 {
            return Err(ConfigError::InvalidConfig(
                "retention.max_turns_per_conversation must be at least 1".to_string(),
            ));
        }

        for (name, section) in &self.responders {
            if Domain::parse(name).is_none() {
                return Err(ConfigError::InvalidConfig(format!(
                    "Unknown responder domain: {name}"
                )));
            }
            if let Some(endpoint) = &section.endpoint {
                validate_url(&format!("responders.{name}.endpoint"), endpoint)?;
            }
        }

        if self.responder(Domain::Faq).disabled {
            return Err(ConfigError::InvalidConfig(
                "The faq responder is the routing fallback and cannot be disabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Settings for one domain, defaulted when the file has no section for it
    pub fn responder(&self, domain: Domain) -> ResponderSection {
        self.responders
            .get(domain.key())
            .cloned()
            .unwrap_or_default()
    }

    /// Get LLM API key from environment variable
    pub fn get_llm_api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.llm.api_key_env)
            .map_err(|_| ConfigError::EnvVarNotFound(self.llm.api_key_env.clone()))
    }

    /// Address the HTTP surface binds to
    pub fn bind_address(&self) -> Result<std::net::SocketAddr, ConfigError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| ConfigError::InvalidConfig(format!("Invalid server address: {e}")))
    }

    /// Create a test configuration for unit testing
    pub fn test_config() -> Self {
        Self {
            server: ServerSection::default(),
            processing: ProcessingSection::default(),
            retention: RetentionSection::default(),
            llm: LlmSection {
                provider: "openai".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                base_url: None,
                api_version: None,
                temperature: Some(0.0),
                max_tokens: Some(1000),
                timeout_secs: default_llm_timeout(),
            },
            routing: RoutingSection::default(),
            responders: HashMap::new(),
        }
    }
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        field: field.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::InvalidUrl {
            field: field.to_string(),
            reason: format!("unsupported scheme '{scheme}'"),
        }),
    }
}
