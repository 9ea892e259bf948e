//! Provider adapters
//!
//! A provider adapter is the only piece of Ensemble that talks to a backend.
//! It takes a model spec plus a system/user prompt pair and returns the raw
//! generated text with token accounting, or a typed [`ProviderError`].
//!
//! Adapters make exactly one attempt per call. Retries, fallbacks and
//! timeouts belong to the execution strategies.

mod dry_run;
mod openrouter;
mod types;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::ModelSpec;

pub use dry_run::DryRunAdapter;
pub use openrouter::{OPENROUTER_BASE_URL, OpenRouterAdapter, OpenRouterAdapterBuilder};
pub use types::{ChatRequest, ChatResponse, Choice, FinishReason, Message, MessageRole, Usage};

/// Token accounting for a single invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub input_tokens: u32,
    /// Completion tokens
    pub output_tokens: u32,
    /// Total tokens as reported by the backend
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Create a usage record whose total is input + output
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// Raw output of a successful invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Generated text
    pub content: String,
    /// Token accounting
    pub usage: TokenUsage,
}

impl Completion {
    pub fn new(content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            content: content.into(),
            usage,
        }
    }
}

/// Why a single invocation failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Uniform interface to invoke one backend
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Invoke the model once. Must respect `model.max_tokens` and
    /// `model.temperature` and must not retry internally.
    async fn invoke(
        &self,
        model: &ModelSpec,
        system_prompt: &str,
        user_prompt: &str,
    ) -> std::result::Result<Completion, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(120, 30);
        assert_eq!(usage.total_tokens, 150);
        assert_eq!(TokenUsage::default().total_tokens, 0);
    }

    #[test]
    fn test_provider_error_display() {
        assert_eq!(
            ProviderError::Timeout(Duration::from_millis(2500)).to_string(),
            "timed out after 2.5s"
        );
        assert_eq!(
            ProviderError::Api {
                status: 503,
                message: "overloaded".into()
            }
            .to_string(),
            "API error (503): overloaded"
        );
    }
}
