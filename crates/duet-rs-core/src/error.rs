//! Error types for the chat core.

use crate::store::StoreError;
use crate::types::SessionId;
use thiserror::Error;

/// Hint appended to local generation failures.
const LOCAL_REMEDIATION: &str =
    "Make sure the local model runtime is running and the configured model is installed.";

/// Failures that end a single turn.
///
/// The display form is user-facing: the orchestrator records it verbatim as
/// the content of an error message, prefixed with `Error: `.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The selected backend lacks required configuration (e.g. a credential).
    #[error("{0}")]
    Configuration(String),
    /// The local backend cannot serve requests on this device right now.
    #[error("{0}")]
    LocalUnavailable(String),
    /// Transport or protocol failure talking to the remote backend.
    #[error("{0}")]
    Network(String),
    /// The local model failed while generating.
    #[error(
        "Failed to generate a response with the local model ({detail}). {hint}",
        hint = LOCAL_REMEDIATION
    )]
    LocalGeneration { detail: String },
    /// No delta arrived within the configured idle timeout.
    #[error("The model stopped responding (no output for {0} seconds).")]
    Stalled(u64),
}

impl GenerationError {
    pub fn local_generation(detail: impl Into<String>) -> Self {
        Self::LocalGeneration {
            detail: detail.into(),
        }
    }
}

/// Errors returned by chat controller operations other than turns.
#[derive(Debug, Error)]
pub enum DuetCoreError {
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::GenerationError;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_is_the_bare_user_message() {
        let err = GenerationError::Configuration("API key is missing.".to_string());
        assert_eq!(err.to_string(), "API key is missing.");
    }

    #[test]
    fn local_generation_carries_remediation_hint() {
        let text = GenerationError::local_generation("runtime crashed").to_string();
        assert!(text.contains("runtime crashed"));
        assert!(text.contains("local model runtime is running"));
    }
}
