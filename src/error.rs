//! Error types for the revenue copilot.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Intent error: {0}")]
    Intent(#[from] IntentError),

    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("Dealflow error: {0}")]
    Dealflow(#[from] DealflowError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Embedding generation failed: {reason}")]
    EmbeddingFailed { reason: String },

    #[error("Circuit breaker open for provider {provider}")]
    CircuitOpen { provider: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Transport failures and rate limits are transient; parse failures,
    /// auth failures, and an open breaker are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RequestFailed { .. } | LlmError::RateLimited { .. }
        )
    }
}

/// Intent classification errors.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("Empty message")]
    EmptyMessage,

    #[error("Unparseable classification response: {0}")]
    UnparseableResponse(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Knowledge agent errors.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("Empty document: {document_id}")]
    EmptyDocument { document_id: String },

    #[error("Empty query")]
    EmptyQuery,

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Dealflow agent errors.
#[derive(Debug, thiserror::Error)]
pub enum DealflowError {
    #[error("No lead data could be extracted from input")]
    EmptyLead,

    #[error("Lead not found: {id}")]
    LeadNotFound { id: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Schedule parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("No temporal signal in text")]
    NoTemporalSignal,

    #[error("Invalid time: {0}")]
    InvalidTime(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
