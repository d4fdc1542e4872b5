//! Error types for debate-forge operations.
//!
//! One enum per subsystem:
//! - LLM chat completions
//! - Text embeddings
//! - Configuration files (models, strategist, debate settings)
//! - Debate orchestration and the discussion strategist
//! - Per-room sessions and transcript delivery

use thiserror::Error;

/// Errors raised by chat-completion clients.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key for model '{0}'")]
    MissingApiKey(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Context length exceeded: {limit} tokens")]
    ContextLengthExceeded { limit: u32 },

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("LLM returned no content")]
    EmptyCompletion,
}

/// Errors raised by embedding backends.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {0}")]
    RequestFailed(String),

    #[error("Embedding API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Embedding dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Errors raised while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to parse '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("Unknown model tag '{0}'")]
    UnknownModel(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while running a debate.
#[derive(Debug, Error)]
pub enum DebateError {
    /// A history placeholder was used while the agenda it refers to is empty.
    #[error("{placeholder} is used but {agenda} is empty")]
    MissingAgenda {
        placeholder: &'static str,
        agenda: &'static str,
    },

    #[error("Debate has no panelists")]
    NoPanelists,

    #[error("Strategy requested but no strategist is configured")]
    StrategistUnavailable,

    #[error("Discussion state '{0}' has no legal interventions configured")]
    UnknownState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Evaluator returned {actual} scores for {expected} candidates")]
    ScoreCountMismatch { expected: usize, actual: usize },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result alias for debate operations.
pub type DebateResult<T> = std::result::Result<T, DebateError>;

/// Errors raised by a room's session controller.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("A discussion is already running in this room")]
    Busy,

    #[error("No discussion has been started in this room")]
    NotStarted,

    #[error("Room {0} not found")]
    RoomNotFound(u64),

    #[error("An executor is already connected to this room")]
    DuplicateExecutor,

    #[error("Cache file error for '{path}': {message}")]
    Cache { path: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Debate error: {0}")]
    Debate(#[from] DebateError),
}

/// Result alias for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

impl From<LlmError> for SessionError {
    fn from(err: LlmError) -> Self {
        SessionError::Debate(DebateError::Llm(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_agenda_message() {
        let err = DebateError::MissingAgenda {
            placeholder: "${__opponents_comments_on_last_agenda__}",
            agenda: "last_agenda",
        };
        assert_eq!(
            err.to_string(),
            "${__opponents_comments_on_last_agenda__} is used but last_agenda is empty"
        );
    }

    #[test]
    fn test_llm_error_converts_through_debate() {
        let err: SessionError = LlmError::RateLimited("slow down".to_string()).into();
        assert!(matches!(err, SessionError::Debate(DebateError::Llm(_))));
        assert!(err.to_string().contains("slow down"));
    }
}
