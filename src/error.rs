//! Error types for kopi-debate operations.
//!
//! Defines error types for each subsystem:
//! - LLM transport (HTTP calls to the generation service)
//! - Debate provider (configuration, generation, sanitising, extraction)
//! - Conversation storage
//! - Configuration loading
//! - The request-handling boundary that ties them together

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the HTTP generation client.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: OPENAI_API_KEY is not configured")]
    MissingApiKey,

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("LLM returned no content")]
    EmptyContent,
}

impl LlmError {
    /// Whether a retry of the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Timeout { .. } | LlmError::RateLimited(_) => true,
            LlmError::RequestFailed(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("connection")
                    || msg.contains("temporarily")
            }
            LlmError::ApiError { code, .. } => *code >= 500 || *code == 429,
            _ => false,
        }
    }
}

/// Errors surfaced by the debate core to its caller.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider could not be constructed (missing credential, bad client setup).
    #[error("Provider configuration error: {0}")]
    Configuration(String),

    /// The generation call failed or produced no content.
    #[error("Generation failed: {0}")]
    Generation(#[source] LlmError),

    /// Generation succeeded but the text was unusable after cleaning.
    #[error("Empty response: {0}")]
    EmptyResponse(String),

    /// The topic/stance generation call itself failed.
    #[error("Topic/stance extraction failed: {0}")]
    Extraction(#[source] LlmError),
}

impl ProviderError {
    /// Generation and empty-response failures are handled the same way by callers.
    pub fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            ProviderError::Generation(_) | ProviderError::EmptyResponse(_)
        )
    }
}

/// Errors that can occur during conversation storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors returned by the debate service to the request-handling layer.
#[derive(Debug, Error)]
pub enum DebateError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    InvalidConversationId(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(Uuid),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for service operations.
pub type DebateResult<T> = Result<T, DebateError>;
