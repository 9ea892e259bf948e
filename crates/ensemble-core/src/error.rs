//! Error types for Ensemble

use thiserror::Error;

use crate::engine::{ModelResponse, Strategy};

/// Result type alias using Ensemble's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Ensemble error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Routing errors (E100-E199)
    #[error("No eligible model for task type '{0}'. Run `ensemble models` to see registered capabilities.")]
    NoEligibleModel(String),

    #[error("Unknown model '{0}'. Run `ensemble models` to see all registered models.")]
    UnknownModel(String),

    #[error("Model '{0}' is already registered")]
    ModelAlreadyRegistered(String),

    // Execution errors (E200-E299)
    #[error("All {} candidate models failed ({strategy}): {}", .responses.len(), summarize_failures(.responses))]
    AllCandidatesFailed {
        strategy: Strategy,
        responses: Vec<ModelResponse>,
    },

    #[error("Primary model '{model}' failed ({strategy}): {}", summarize_failures(.responses))]
    PrimaryModelFailed {
        strategy: Strategy,
        model: String,
        responses: Vec<ModelResponse>,
    },

    #[error("Unsupported strategy '{0}'. Valid options: sequential, parallel, competitive, collaborative, hierarchical")]
    UnsupportedStrategy(String),

    // Input errors (E300-E399)
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    // Network errors (E400-E499)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoEligibleModel(_) => "E100",
            Self::UnknownModel(_) => "E101",
            Self::ModelAlreadyRegistered(_) => "E102",
            Self::AllCandidatesFailed { .. } => "E200",
            Self::PrimaryModelFailed { .. } => "E201",
            Self::UnsupportedStrategy(_) => "E202",
            Self::InvalidTask(_) => "E300",
            Self::NetworkError(_) => "E400",
            Self::ConfigError(_) => "E600",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NoEligibleModel(_) | Self::UnknownModel(_) => Some("ensemble models".to_string()),
            Self::UnsupportedStrategy(_) => {
                Some("ensemble config set orchestration.default_strategy parallel".to_string())
            }
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::AllCandidatesFailed { .. } | Self::PrimaryModelFailed { .. } => {
                Some("Re-run with `--dry-run` to check routing without network calls".to_string())
            }
            _ => None,
        }
    }

    /// Every recorded attempt carried by an execution failure
    pub fn responses(&self) -> &[ModelResponse] {
        match self {
            Self::AllCandidatesFailed { responses, .. }
            | Self::PrimaryModelFailed { responses, .. } => responses,
            _ => &[],
        }
    }
}

fn summarize_failures(responses: &[ModelResponse]) -> String {
    responses
        .iter()
        .map(|r| {
            format!(
                "{}: {}",
                r.model_name,
                r.error.as_deref().unwrap_or("no error recorded")
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::TaskType;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::NoEligibleModel("x".into()).code(), "E100");
        assert_eq!(Error::UnsupportedStrategy("x".into()).code(), "E202");
        assert_eq!(Error::Other("x".into()).code(), "E9999");
    }

    #[test]
    fn test_all_failed_message_lists_models() {
        let err = Error::AllCandidatesFailed {
            strategy: Strategy::Parallel,
            responses: vec![
                ModelResponse::failure("a/one", TaskType::ComponentGeneration, "boom", Default::default()),
                ModelResponse::failure("b/two", TaskType::ComponentGeneration, "timeout", Default::default()),
            ],
        };

        let message = err.to_string();
        assert!(message.contains("All 2 candidate models failed (parallel)"));
        assert!(message.contains("a/one: boom"));
        assert!(message.contains("b/two: timeout"));
        assert_eq!(err.responses().len(), 2);
    }

    #[test]
    fn test_suggestion() {
        assert_eq!(
            Error::UnknownModel("m".into()).suggestion().as_deref(),
            Some("ensemble models")
        );
        assert!(Error::InvalidTask("x".into()).suggestion().is_none());
    }
}
