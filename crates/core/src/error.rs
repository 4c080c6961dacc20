//! Error types for ragent.
//!
//! One enum covers every failure category. The workflow-step variants
//! (`Retrieval`, `Grading`, `Rewrite`, `Generation`) let the controller tell
//! absorbable step failures apart from the one fatal condition.

use thiserror::Error;

/// Unified error type for ragent.
///
/// All fallible functions return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Knowledge base and indexing errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Context store could not be queried (transient)
    #[error("Retrieval failure: {0}")]
    Retrieval(String),

    /// Relevance grading failed for a passage
    #[error("Grading failure: {0}")]
    Grading(String),

    /// Query rewriting failed
    #[error("Rewrite failure: {0}")]
    Rewrite(String),

    /// Answer generation failed; the only fatal workflow error
    #[error("Generation failure: {0}")]
    Generation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        let err = AppError::Generation("model unavailable".into());
        assert_eq!(err.to_string(), "Generation failure: model unavailable");
    }

    #[test]
    fn test_from_serde_json() {
        let err: AppError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
