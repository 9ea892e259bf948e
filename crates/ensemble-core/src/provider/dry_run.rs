//! Offline adapter that never touches the network

use async_trait::async_trait;

use super::{Completion, ProviderAdapter, ProviderError, TokenUsage};
use crate::registry::ModelSpec;

/// Adapter returning a deterministic placeholder response
///
/// Used by `ensemble run --dry-run` to exercise routing and strategies
/// without credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunAdapter;

impl DryRunAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProviderAdapter for DryRunAdapter {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn invoke(
        &self,
        model: &ModelSpec,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<Completion, ProviderError> {
        let request = user_prompt.lines().next().unwrap_or_default();
        let content = format!(
            "[dry-run] {} would answer: {}\n\n```\n// {} tokens max, temperature {}\n```",
            model.name, request, model.max_tokens, model.temperature
        );

        let usage = TokenUsage::new(
            estimate_tokens(system_prompt) + estimate_tokens(user_prompt),
            estimate_tokens(&content),
        );

        Ok(Completion::new(content, usage))
    }
}

/// Rough token estimate: ~4 characters per token
fn estimate_tokens(text: &str) -> u32 {
    (text.len() / 4) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_is_deterministic() {
        let adapter = DryRunAdapter::new();
        let model = ModelSpec::new("test/model", "test");

        let first = adapter.invoke(&model, "system", "Build a button\nmore").await.unwrap();
        let second = adapter.invoke(&model, "system", "Build a button\nmore").await.unwrap();

        assert_eq!(first, second);
        assert!(first.content.contains("test/model would answer: Build a button"));
        assert!(first.content.contains("```"));
        assert!(first.usage.total_tokens > 0);
    }
}
