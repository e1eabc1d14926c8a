//! Error taxonomies for the SEOForge core.
//!
//! `IntegrationError` is the closed set of outcomes an external call can
//! produce after the retry loop is exhausted. `CoreError` covers validation,
//! lookup, and pipeline-step failures inside the core itself.

use thiserror::Error;

/// Errors surfaced by the HTTP integration layer.
#[derive(Error, Debug, Clone)]
pub enum IntegrationError {
    /// Circuit breaker forbids execution; no request was issued.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// Network or provider-poll timeout after retry exhaustion.
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// HTTP 429 after retry exhaustion (or Retry-After too large to honor).
    #[error("rate limit exceeded{}", .retry_after.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    /// HTTP 401/403; never retried.
    #[error("authentication failed ({status})")]
    AuthFailed { status: u16 },

    /// Other HTTP 4xx; never retried.
    #[error("client error ({status}): {body}")]
    Client { status: u16, body: String },

    /// HTTP 5xx after retry exhaustion.
    #[error("server error ({status})")]
    Server { status: u16 },

    /// DNS/connect/TLS failure after retry exhaustion.
    #[error("transport error: {0}")]
    Transport(String),

    /// Adapter has no API key configured.
    #[error("{provider} not configured (missing API key)")]
    NotConfigured { provider: &'static str },

    /// Provider returned a 2xx body the adapter could not interpret.
    #[error("unexpected response from {provider}: {message}")]
    UnexpectedResponse {
        provider: &'static str,
        message: String,
    },
}

impl IntegrationError {
    /// Short machine-readable kind for structured logs and qa_results blobs.
    pub fn kind(&self) -> &'static str {
        match self {
            IntegrationError::CircuitOpen => "circuit_open",
            IntegrationError::Timeout { .. } => "timeout",
            IntegrationError::RateLimited { .. } => "rate_limited",
            IntegrationError::AuthFailed { .. } => "auth_failed",
            IntegrationError::Client { .. } => "client_error",
            IntegrationError::Server { .. } => "server_error",
            IntegrationError::Transport(_) => "transport",
            IntegrationError::NotConfigured { .. } => "not_configured",
            IntegrationError::UnexpectedResponse { .. } => "unexpected_response",
        }
    }
}

pub type IntegrationResult<T> = Result<T, IntegrationError>;

/// Errors raised by core services outside the integration layer.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation failed for '{field}' (value: {value}): {message}")]
    Validation {
        field: String,
        value: String,
        message: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("duplicate {entity} for {id}")]
    Duplicate { entity: &'static str, id: String },

    /// Wraps a per-page stage failure with the stage name attached.
    #[error("pipeline step '{step}' failed: {source}")]
    PipelineStep {
        step: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Integration(#[from] IntegrationError),
}

impl CoreError {
    pub fn validation(
        field: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CoreError::Validation {
            field: field.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn step(
        step: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CoreError::PipelineStep {
            step,
            source: Box::new(source),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
