//! Execution engine
//!
//! The engine runs one [`Strategy`] over a ranked candidate list and folds
//! the individual [`ModelResponse`]s into a single [`OrchestrationResult`].
//!
//! Every strategy is built on the same primitive: invoke one model with the
//! task and the current context, bounded by `TaskSpec::max_execution_time`.
//! An invocation never fails the call by itself. Network errors, timeouts
//! and malformed responses become failed responses, are recorded with the
//! [`PerformanceTracker`], and the strategy carries on with the remaining
//! candidates. Only a strategy that ends with nothing usable returns an
//! error.

mod prompt;
mod strategies;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::performance::PerformanceTracker;
use crate::provider::{ProviderAdapter, ProviderError};
use crate::registry::{ModelRegistry, ModelSpec};
use crate::routing::TaskSpec;
use crate::scoring::ResponseScorer;

pub use prompt::{DefaultPromptBuilder, PromptBuilder, Role};
pub use strategies::{COMPOSITE_EPSILON, composite_score, select_competitive_winner};
pub use types::{ExecutionContext, ModelResponse, OrchestrationResult, Strategy, context_keys};

/// Default confidence an assistant must exceed to replace the running result
pub const DEFAULT_ASSISTANT_THRESHOLD: f64 = 0.7;

/// Runs dispatch strategies against a provider adapter
pub struct ExecutionEngine {
    registry: Arc<ModelRegistry>,
    adapter: Arc<dyn ProviderAdapter>,
    tracker: Arc<PerformanceTracker>,
    scorer: ResponseScorer,
    prompts: Arc<dyn PromptBuilder>,
    assistant_threshold: f64,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("adapter", &self.adapter.name())
            .field("models", &self.registry.len())
            .field("assistant_threshold", &self.assistant_threshold)
            .finish()
    }
}

impl ExecutionEngine {
    /// Create an engine with the default prompt builder
    pub fn new(
        registry: Arc<ModelRegistry>,
        adapter: Arc<dyn ProviderAdapter>,
        tracker: Arc<PerformanceTracker>,
    ) -> Self {
        Self {
            registry,
            adapter,
            tracker,
            scorer: ResponseScorer::new(),
            prompts: Arc::new(DefaultPromptBuilder),
            assistant_threshold: DEFAULT_ASSISTANT_THRESHOLD,
        }
    }

    /// Replace the prompt builder
    pub fn with_prompt_builder(mut self, prompts: Arc<dyn PromptBuilder>) -> Self {
        self.prompts = prompts;
        self
    }

    /// Set the confidence a hierarchical assistant must strictly exceed
    pub fn with_assistant_threshold(mut self, threshold: f64) -> Self {
        self.assistant_threshold = threshold;
        self
    }

    /// Name of the underlying adapter
    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    /// Run `strategy` over `candidates` (already ranked, best first)
    pub async fn execute(
        &self,
        strategy: Strategy,
        task: &TaskSpec,
        context: ExecutionContext,
        candidates: &[String],
    ) -> Result<OrchestrationResult> {
        if candidates.is_empty() {
            return Err(Error::NoEligibleModel(task.task_type.to_string()));
        }
        if let Some(key) = context.reserved_key() {
            return Err(Error::InvalidTask(format!(
                "context key '{}' is set by the engine and cannot be supplied",
                key
            )));
        }

        let models = candidates
            .iter()
            .map(|name| self.registry.get(name))
            .collect::<Result<Vec<&ModelSpec>>>()?;

        info!(
            strategy = %strategy,
            task_type = %task.task_type,
            candidates = models.len(),
            adapter = self.adapter.name(),
            "Executing strategy"
        );

        let started = Instant::now();
        let result = match strategy {
            Strategy::Sequential => self.run_sequential(task, context, &models).await,
            Strategy::Parallel => self.run_parallel(task, &context, &models).await,
            Strategy::Competitive => self.run_competitive(task, &context, &models).await,
            Strategy::Collaborative => self.run_collaborative(task, context, &models).await,
            Strategy::Hierarchical => self.run_hierarchical(task, context, &models).await,
        };

        match &result {
            Ok(r) => info!(
                strategy = %r.strategy_used,
                elapsed_ms = started.elapsed().as_millis() as u64,
                quality = r.quality_score,
                attempts = r.model_responses.len(),
                "Strategy completed"
            ),
            Err(e) => warn!(
                strategy = %strategy,
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %e,
                "Strategy failed"
            ),
        }

        result
    }

    /// Invoke one model once, bounded by the task's time limit
    ///
    /// Always returns a response and always records it with the tracker.
    pub(crate) async fn invoke(
        &self,
        model: &ModelSpec,
        task: &TaskSpec,
        context: &ExecutionContext,
    ) -> ModelResponse {
        let system_prompt = self.prompts.system_prompt(task, model, context);
        let user_prompt = self.prompts.user_prompt(task, model, context);

        debug!(model = %model.name, "Invoking model");

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            task.max_execution_time,
            self.adapter.invoke(model, &system_prompt, &user_prompt),
        )
        .await
        .unwrap_or(Err(ProviderError::Timeout(task.max_execution_time)));
        let execution_time = started.elapsed();

        let response = match outcome {
            Ok(completion) => {
                let confidence = self.scorer.score(&completion.content, model);
                let cost = model.estimate_cost(completion.usage.total_tokens);
                ModelResponse::success(
                    &model.name,
                    task.task_type,
                    completion.content,
                    confidence,
                    execution_time,
                    completion.usage,
                )
                .with_cost(cost)
            }
            Err(e) => {
                warn!(
                    model = %model.name,
                    elapsed_ms = execution_time.as_millis() as u64,
                    error = %e,
                    "Model invocation failed"
                );
                ModelResponse::failure(&model.name, task.task_type, e.to_string(), execution_time)
            }
        };

        self.tracker.record(
            &response.model_name,
            response.success,
            response.confidence,
            response.execution_time,
        );

        response
    }
}

/// Mean confidence over successful responses (0.0 when there are none)
fn mean_confidence(responses: &[ModelResponse]) -> f64 {
    let successes: Vec<f64> = responses
        .iter()
        .filter(|r| r.success)
        .map(|r| r.confidence)
        .collect();
    if successes.is_empty() {
        return 0.0;
    }
    successes.iter().sum::<f64>() / successes.len() as f64
}

/// Index of the most confident success; the earliest wins ties
fn most_confident(responses: &[ModelResponse]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, response) in responses.iter().enumerate() {
        if !response.success {
            continue;
        }
        match best {
            Some(b) if responses[b].confidence >= response.confidence => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Longest single execution time
fn max_time(responses: &[ModelResponse]) -> Duration {
    responses
        .iter()
        .map(|r| r.execution_time)
        .max()
        .unwrap_or_default()
}

/// Sum of execution times
fn sum_time(responses: &[ModelResponse]) -> Duration {
    responses.iter().map(|r| r.execution_time).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::TaskType;

    fn ok(model: &str, confidence: f64) -> ModelResponse {
        ModelResponse::success(
            model,
            TaskType::ComponentGeneration,
            "x",
            confidence,
            Duration::from_secs(1),
            Default::default(),
        )
    }

    fn failed(model: &str) -> ModelResponse {
        ModelResponse::failure(model, TaskType::ComponentGeneration, "boom", Duration::from_secs(2))
    }

    #[test]
    fn test_mean_confidence_ignores_failures() {
        let responses = vec![ok("a", 0.8), failed("b"), ok("c", 0.6)];
        assert!((mean_confidence(&responses) - 0.7).abs() < 1e-12);
        assert_eq!(mean_confidence(&[failed("a")]), 0.0);
    }

    #[test]
    fn test_most_confident_prefers_earliest_on_tie() {
        let responses = vec![failed("a"), ok("b", 0.8), ok("c", 0.8), ok("d", 0.5)];
        assert_eq!(most_confident(&responses), Some(1));
        assert_eq!(most_confident(&[failed("a")]), None);
    }

    #[test]
    fn test_time_aggregates() {
        let responses = vec![ok("a", 0.8), failed("b")];
        assert_eq!(max_time(&responses), Duration::from_secs(2));
        assert_eq!(sum_time(&responses), Duration::from_secs(3));
        assert_eq!(max_time(&[]), Duration::ZERO);
    }
}
