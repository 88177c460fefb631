//! Engine error taxonomy

use thiserror::Error;

/// Errors surfaced by the engine's public operations.
///
/// Upstream and storage failures are normally absorbed by fallbacks inside the
/// orchestrator; they only reach callers when every fallback path failed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("translator unavailable: {0}")]
    TranslatorUnavailable(String),

    #[error("classifier error: {0}")]
    ClassifierError(String),

    #[error("message store error: {0}")]
    MessageStore(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

impl EngineError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        EngineError::Storage(err.to_string())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }

    /// Client errors are never retried or masked by fallbacks.
    pub fn is_client_error(&self) -> bool {
        matches!(self, EngineError::InvalidInput(_))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::TranslatorUnavailable("all backends exhausted".into());
        assert_eq!(err.to_string(), "translator unavailable: all backends exhausted");
    }

    #[test]
    fn test_client_error_classification() {
        assert!(EngineError::invalid("missing session_id").is_client_error());
        assert!(!EngineError::storage("disk full").is_client_error());
        assert!(!EngineError::ClassifierError("empty".into()).is_client_error());
    }
}
