//! Error types for the Semker message engine
//!
//! Client-facing kinds (`NotFound`, `Validation`) map to 4xx responses on the
//! HTTP surface; responder failures are converted into a terminal `failed`
//! update by the scheduler and never escape a background unit.

use crate::protocol::MessageStatus;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for engine operations
#[derive(Debug, Error)]
pub enum SemkerError {
    #[error("Message with ID {request_id} not found")]
    NotFound { request_id: Uuid },

    #[error("Invalid input: {message}")]
    Validation { message: String },

    #[error("Responder {agent} failed: {message}")]
    Responder { agent: String, message: String },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: MessageStatus,
        to: MessageStatus,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("LLM provider error: {0}")]
    Llm(#[from] crate::llm::provider::LlmError),
}

impl SemkerError {
    /// Create not found error
    pub fn not_found(request_id: Uuid) -> Self {
        Self::NotFound { request_id }
    }

    /// Create validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create responder error
    pub fn responder<A: Into<String>, S: Into<String>>(agent: A, message: S) -> Self {
        Self::Responder {
            agent: agent.into(),
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the caller (not the engine) is at fault
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Validation { .. })
    }

    /// HTTP status code used by the transport layer
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation { .. } => 400,
            _ => 500,
        }
    }

    /// Text safe to store in a `failed` update or return to a client
    pub fn public_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is valid")
});

static BEARER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)bearer\s+[a-z0-9._-]+").expect("bearer pattern is valid"));

const MAX_ERROR_LEN: usize = 500;
const TRUNCATE_SUFFIX: &str = "...[truncated]";

/// Sanitize error messages so failed updates never leak credentials or paths
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = BEARER_PATTERN
        .replace_all(&sanitized, "Bearer ***")
        .to_string();

    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_ERROR_LEN {
        let mut cut = MAX_ERROR_LEN - TRUNCATE_SUFFIX.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], TRUNCATE_SUFFIX);
    }

    sanitized
}

/// Result type for engine operations
pub type SemkerResult<T> = Result<T, SemkerError>;
