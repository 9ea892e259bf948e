//! The five dispatch strategies

use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::{Map, Value, json};
use tracing::debug;

use super::prompt::Role;
use super::types::{ExecutionContext, ModelResponse, OrchestrationResult, Strategy, context_keys};
use super::{ExecutionEngine, max_time, mean_confidence, most_confident, sum_time};
use crate::error::{Error, Result};
use crate::registry::{Capability, ModelSpec};
use crate::routing::TaskSpec;

/// Composite scores closer than this are treated as equal
pub const COMPOSITE_EPSILON: f64 = 1e-9;

/// Competitive composite score for one successful response
///
/// `0.4×confidence + 0.3×capability match + 0.2×quality prior + 0.1×(1/(t+0.1))`
/// with `t` in seconds.
pub fn composite_score(
    confidence: f64,
    capability_match_ratio: f64,
    quality_score: f64,
    execution_time: Duration,
) -> f64 {
    0.4 * confidence
        + 0.3 * capability_match_ratio
        + 0.2 * quality_score
        + 0.1 * (1.0 / (execution_time.as_secs_f64() + 0.1))
}

/// Pick the winner from composite scores listed in completion order
///
/// `None` entries are failed attempts. A later score must beat the current
/// best by more than [`COMPOSITE_EPSILON`], so the earliest completion wins
/// ties.
pub fn select_competitive_winner(scores: &[Option<f64>]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, score) in scores.iter().enumerate() {
        let Some(score) = *score else { continue };
        match best {
            Some((_, top)) if score <= top + COMPOSITE_EPSILON => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

fn attempt_summary(response: &ModelResponse) -> Value {
    json!({
        "model": response.model_name,
        "result": response.content,
        "confidence": response.confidence,
        "success": response.success,
    })
}

fn assistant_role(model: &ModelSpec) -> Role {
    if model.has_capability(Capability::AccessibilityReview) {
        Role::AccessibilityReviewer
    } else if model.has_capability(Capability::PerformanceReview) {
        Role::PerformanceReviewer
    } else {
        Role::Reviewer
    }
}

impl ExecutionEngine {
    /// One model at a time in ranked order; every model sees earlier attempts
    pub(super) async fn run_sequential(
        &self,
        task: &TaskSpec,
        mut context: ExecutionContext,
        models: &[&ModelSpec],
    ) -> Result<OrchestrationResult> {
        let mut responses: Vec<ModelResponse> = Vec::with_capacity(models.len());
        let mut attempts: Vec<Value> = Vec::with_capacity(models.len());
        let mut best: Option<usize> = None;

        for model in models {
            let response = self.invoke(model, task, &context).await;

            attempts.push(attempt_summary(&response));
            context.insert(context_keys::PREVIOUS_ATTEMPTS, Value::Array(attempts.clone()));

            // A lower-confidence response never replaces the running best
            let improves = match best {
                Some(b) => response.success && response.confidence > responses[b].confidence,
                None => response.success,
            };
            if improves {
                best = Some(responses.len());
            }
            responses.push(response);
        }

        let Some(best) = best else {
            return Err(Error::AllCandidatesFailed {
                strategy: Strategy::Sequential,
                responses,
            });
        };

        let mean = mean_confidence(&responses);
        let winner = responses[best].model_name.clone();
        let primary = responses[best].content.clone();
        let total = sum_time(&responses);

        Ok(
            OrchestrationResult::new(Strategy::Sequential, primary, responses, total)
                .with_scores(mean, mean)
                .with_metadata("winner", winner),
        )
    }

    /// Invoke every model concurrently with the same context
    ///
    /// Responses come back in completion order.
    async fn fan_out(
        &self,
        task: &TaskSpec,
        context: &ExecutionContext,
        models: &[&ModelSpec],
    ) -> Vec<ModelResponse> {
        let mut pending = models
            .iter()
            .map(|model| self.invoke(model, task, context))
            .collect::<FuturesUnordered<_>>();

        let mut responses = Vec::with_capacity(models.len());
        while let Some(response) = pending.next().await {
            responses.push(response);
        }
        responses
    }

    pub(super) async fn run_parallel(
        &self,
        task: &TaskSpec,
        context: &ExecutionContext,
        models: &[&ModelSpec],
    ) -> Result<OrchestrationResult> {
        let responses = self.fan_out(task, context, models).await;

        let Some(best) = most_confident(&responses) else {
            return Err(Error::AllCandidatesFailed {
                strategy: Strategy::Parallel,
                responses,
            });
        };

        let confidence = responses[best].confidence;
        let winner = responses[best].model_name.clone();
        let primary = responses[best].content.clone();
        let total = max_time(&responses);

        Ok(
            OrchestrationResult::new(Strategy::Parallel, primary, responses, total)
                .with_scores(confidence, confidence)
                .with_metadata("winner", winner),
        )
    }

    /// Parallel fan-out, winner chosen by composite score
    pub(super) async fn run_competitive(
        &self,
        task: &TaskSpec,
        context: &ExecutionContext,
        models: &[&ModelSpec],
    ) -> Result<OrchestrationResult> {
        let responses = self.fan_out(task, context, models).await;

        let scores: Vec<Option<f64>> = responses
            .iter()
            .map(|response| {
                if !response.success {
                    return None;
                }
                let model = models.iter().find(|m| m.name == response.model_name)?;
                Some(composite_score(
                    response.confidence,
                    model.capability_match_ratio(&task.required_capabilities),
                    model.quality_score,
                    response.execution_time,
                ))
            })
            .collect();

        let Some(winner) = select_competitive_winner(&scores) else {
            return Err(Error::AllCandidatesFailed {
                strategy: Strategy::Competitive,
                responses,
            });
        };

        let mut all_scores = Map::new();
        for (response, score) in responses.iter().zip(&scores) {
            if let Some(score) = score {
                all_scores.insert(response.model_name.clone(), json!(score));
            }
        }

        let best_confidence = responses
            .iter()
            .filter(|r| r.success)
            .map(|r| r.confidence)
            .fold(0.0, f64::max);
        let winner_score = scores[winner].unwrap_or_default();
        let winner_name = responses[winner].model_name.clone();
        let primary = responses[winner].content.clone();
        let total = max_time(&responses);

        debug!(winner = %winner_name, composite = winner_score, "Competitive winner selected");

        Ok(
            OrchestrationResult::new(Strategy::Competitive, primary, responses, total)
                .with_scores(best_confidence, best_confidence)
                .with_metadata("winner", winner_name)
                .with_metadata("composite_score", winner_score)
                .with_metadata("composite_scores", Value::Object(all_scores)),
        )
    }

    /// Generator then enhancer; fewer than two candidates runs sequentially
    pub(super) async fn run_collaborative(
        &self,
        task: &TaskSpec,
        context: ExecutionContext,
        models: &[&ModelSpec],
    ) -> Result<OrchestrationResult> {
        let (generator, enhancer) = match models {
            [generator, enhancer, ..] => (*generator, *enhancer),
            _ => {
                debug!(candidates = models.len(), "Collaborative needs two models, running sequentially");
                let result = self.run_sequential(task, context, models).await?;
                return Ok(result.with_metadata("degraded_from", Strategy::Collaborative.as_str()));
            }
        };

        let initial = self.invoke(generator, task, &context).await;
        if !initial.success {
            return Err(Error::PrimaryModelFailed {
                strategy: Strategy::Collaborative,
                model: generator.name.clone(),
                responses: vec![initial],
            });
        }

        let mut refine_context = context;
        refine_context.insert(context_keys::INITIAL_CODE, initial.content.clone());
        refine_context.insert(context_keys::ROLE, Role::Enhancer.as_str());

        let refined = self.invoke(enhancer, task, &refine_context).await;
        let enhanced = refined.success;
        let responses = vec![initial, refined];
        let final_index = if enhanced { 1 } else { 0 };

        let confidence = responses[final_index].confidence;
        let primary = responses[final_index].content.clone();
        let total = sum_time(&responses);

        Ok(
            OrchestrationResult::new(Strategy::Collaborative, primary, responses, total)
                .with_scores(confidence, confidence)
                .with_metadata("generator", generator.name.clone())
                .with_metadata("enhancer", enhancer.name.clone())
                .with_metadata("enhanced", enhanced),
        )
    }

    /// Primary model reviewed by role-specific assistants
    pub(super) async fn run_hierarchical(
        &self,
        task: &TaskSpec,
        context: ExecutionContext,
        models: &[&ModelSpec],
    ) -> Result<OrchestrationResult> {
        let Some((primary_model, assistants)) = models.split_first() else {
            return Err(Error::NoEligibleModel(task.task_type.to_string()));
        };

        let primary = self.invoke(primary_model, task, &context).await;
        if !primary.success {
            return Err(Error::PrimaryModelFailed {
                strategy: Strategy::Hierarchical,
                model: primary_model.name.clone(),
                responses: vec![primary],
            });
        }

        let mut review_context = context;
        review_context.insert(context_keys::PRIMARY_RESULT, primary.content.clone());

        let primary_confidence = primary.confidence;
        let mut responses = vec![primary];
        let mut running = 0;
        let mut assistant_sum = 0.0;

        for assistant in assistants {
            let role = assistant_role(assistant);
            review_context.insert(context_keys::ROLE, role.as_str());

            let response = self.invoke(assistant, task, &review_context).await;
            if response.success {
                assistant_sum += response.confidence;
            }

            // Strictly greater: a response exactly at the threshold is kept on record only
            if response.success && response.confidence > self.assistant_threshold {
                debug!(model = %response.model_name, role = %role, "Assistant replaced running result");
                running = responses.len();
            }
            responses.push(response);
        }

        let quality = (primary_confidence + 0.1 * assistant_sum).min(1.0);
        let confidence = responses[running].confidence;
        let final_model = responses[running].model_name.clone();
        let result = responses[running].content.clone();
        let total = sum_time(&responses);

        Ok(
            OrchestrationResult::new(Strategy::Hierarchical, result, responses, total)
                .with_scores(quality, confidence)
                .with_metadata("primary_model", primary_model.name.clone())
                .with_metadata("assistant_count", assistants.len())
                .with_metadata("final_model", final_model),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::performance::PerformanceTracker;
    use crate::provider::{Completion, ProviderAdapter, ProviderError, TokenUsage};
    use crate::registry::ModelRegistry;
    use crate::routing::TaskType;

    /// Per-model scripted behaviour: delay, then content or an error
    #[derive(Default)]
    struct ScriptedAdapter {
        scripts: HashMap<String, (Duration, std::result::Result<String, ProviderError>)>,
        prompts: std::sync::Mutex<Vec<(String, String, String)>>,
    }

    impl ScriptedAdapter {
        fn ok(mut self, model: &str, delay_ms: u64, content: &str) -> Self {
            self.scripts.insert(
                model.to_string(),
                (Duration::from_millis(delay_ms), Ok(content.to_string())),
            );
            self
        }

        fn fail(mut self, model: &str, delay_ms: u64) -> Self {
            self.scripts.insert(
                model.to_string(),
                (
                    Duration::from_millis(delay_ms),
                    Err(ProviderError::Network("connection reset".to_string())),
                ),
            );
            self
        }

        fn prompts_for(&self, model: &str) -> Vec<(String, String)> {
            self.prompts
                .lock()
                .unwrap()
                .iter()
                .filter(|(m, _, _)| m == model)
                .map(|(_, s, u)| (s.clone(), u.clone()))
                .collect()
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn invoke(
            &self,
            model: &ModelSpec,
            system_prompt: &str,
            user_prompt: &str,
        ) -> std::result::Result<Completion, ProviderError> {
            self.prompts.lock().unwrap().push((
                model.name.clone(),
                system_prompt.to_string(),
                user_prompt.to_string(),
            ));
            let (delay, outcome) = self
                .scripts
                .get(&model.name)
                .cloned()
                .unwrap_or((Duration::ZERO, Ok("default".to_string())));
            tokio::time::sleep(delay).await;
            outcome.map(|content| Completion::new(content, TokenUsage::new(10, 10)))
        }
    }

    fn registry() -> Arc<ModelRegistry> {
        let mut registry = ModelRegistry::new();
        for (name, quality, caps) in [
            ("t/high", 0.9, vec![Capability::CodeGeneration]),
            ("t/mid", 0.8, vec![Capability::CodeGeneration]),
            ("t/low", 0.65, vec![Capability::CodeGeneration]),
            ("t/edge", 0.7, vec![Capability::CodeGeneration]),
            ("t/a11y", 0.9, vec![Capability::AccessibilityReview, Capability::CodeReview]),
            ("t/perf", 0.9, vec![Capability::PerformanceReview]),
        ] {
            registry
                .register(
                    ModelSpec::new(name, "test")
                        .with_capabilities(caps)
                        .with_quality(quality)
                        .with_cost_per_token(0.001),
                )
                .unwrap();
        }
        Arc::new(registry)
    }

    fn engine(adapter: Arc<ScriptedAdapter>) -> ExecutionEngine {
        ExecutionEngine::new(registry(), adapter, Arc::new(PerformanceTracker::new()))
    }

    fn task() -> TaskSpec {
        TaskSpec::new(TaskType::ComponentGeneration, "Build a button")
            .with_max_execution_time(Duration::from_secs(10))
    }

    fn names(models: &[&str]) -> Vec<String> {
        models.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn test_composite_score_formula() {
        let score = composite_score(1.0, 1.0, 1.0, Duration::from_millis(900));
        assert!((score - (0.4 + 0.3 + 0.2 + 0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_select_competitive_winner_tie_goes_to_earliest() {
        assert_eq!(select_competitive_winner(&[Some(0.8), Some(0.8)]), Some(0));
        assert_eq!(select_competitive_winner(&[None, Some(0.5), Some(0.9)]), Some(2));
        assert_eq!(select_competitive_winner(&[Some(0.7), Some(0.7 + 1e-12)]), Some(0));
        assert_eq!(select_competitive_winner(&[None, None]), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_times_out() {
        let adapter = Arc::new(ScriptedAdapter::default().ok("t/high", 30_000, "late"));
        let engine = engine(adapter);
        let model = engine.registry.get("t/high").unwrap().clone();

        let response = engine.invoke(&model, &task(), &ExecutionContext::new()).await;

        assert!(!response.success);
        assert!(response.error.unwrap().contains("timed out"));
        assert_eq!(response.execution_time, Duration::from_secs(10));
        assert_eq!(engine.tracker().stats("t/high").total_executions, 1);
    }

    #[tokio::test]
    async fn test_invoke_scores_and_costs_success() {
        let adapter = Arc::new(ScriptedAdapter::default().ok("t/mid", 0, "```ts\nconst x = 1\n```"));
        let engine = engine(adapter);
        let model = engine.registry.get("t/mid").unwrap().clone();

        let response = engine.invoke(&model, &task(), &ExecutionContext::new()).await;

        assert!(response.success);
        assert!((response.confidence - 0.9).abs() < 1e-9);
        assert!((response.cost_usd - 0.02).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_unknown_candidate_is_rejected() {
        let engine = engine(Arc::new(ScriptedAdapter::default()));
        let err = engine
            .execute(Strategy::Parallel, &task(), ExecutionContext::new(), &names(&["nope/x"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownModel(_)));
    }

    #[tokio::test]
    async fn test_empty_candidates_fail_fast() {
        let engine = engine(Arc::new(ScriptedAdapter::default()));
        let err = engine
            .execute(Strategy::Sequential, &task(), ExecutionContext::new(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoEligibleModel(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_shares_previous_attempts() {
        let adapter = Arc::new(
            ScriptedAdapter::default()
                .ok("t/high", 1_000, "first")
                .fail("t/mid", 500)
                .ok("t/low", 2_000, "third"),
        );
        let engine = engine(adapter.clone());
        let context = ExecutionContext::new().with("framework", "react");

        let result = engine
            .execute(Strategy::Sequential, &task(), context, &names(&["t/high", "t/mid", "t/low"]))
            .await
            .unwrap();

        assert_eq!(result.primary_result, "first");
        assert_eq!(result.model_responses.len(), 3);
        assert_eq!(result.total_execution_time, Duration::from_millis(3_500));
        assert!((result.quality_score - (0.9 + 0.65) / 2.0).abs() < 1e-9);

        let (_, first_prompt) = &adapter.prompts_for("t/high")[0];
        assert!(!first_prompt.contains("previousAttempts"));
        let (_, third_prompt) = &adapter.prompts_for("t/low")[0];
        assert!(third_prompt.contains("previousAttempts"));
        assert!(third_prompt.contains("\"framework\": \"react\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_reports_completion_order() {
        let adapter = Arc::new(
            ScriptedAdapter::default()
                .ok("t/high", 300, "high")
                .ok("t/mid", 100, "mid")
                .fail("t/low", 200),
        );
        let engine = engine(adapter);

        let result = engine
            .execute(Strategy::Parallel, &task(), ExecutionContext::new(), &names(&["t/high", "t/mid", "t/low"]))
            .await
            .unwrap();

        let order: Vec<&str> = result.model_responses.iter().map(|r| r.model_name.as_str()).collect();
        assert_eq!(order, vec!["t/mid", "t/low", "t/high"]);
        assert_eq!(result.primary_result, "high");
        assert_eq!(result.metadata["winner"], "t/high");
        assert_eq!(result.total_execution_time, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_competitive_records_composite() {
        let adapter = Arc::new(ScriptedAdapter::default().ok("t/high", 100, "a").ok("t/low", 100, "b"));
        let engine = engine(adapter);

        let result = engine
            .execute(Strategy::Competitive, &task(), ExecutionContext::new(), &names(&["t/low", "t/high"]))
            .await
            .unwrap();

        assert_eq!(result.metadata["winner"], "t/high");
        let expected = composite_score(0.9, 1.0, 0.9, Duration::from_millis(100));
        let recorded = result.metadata["composite_score"].as_f64().unwrap();
        assert!((recorded - expected).abs() < 1e-9);
        assert_eq!(result.metadata["composite_scores"].as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_collaborative_refines_and_falls_back() {
        let adapter = Arc::new(ScriptedAdapter::default().ok("t/mid", 0, "draft").ok("t/high", 0, "polished"));
        let refine_engine = engine(adapter.clone());

        let result = refine_engine
            .execute(Strategy::Collaborative, &task(), ExecutionContext::new(), &names(&["t/mid", "t/high"]))
            .await
            .unwrap();

        assert_eq!(result.primary_result, "polished");
        assert_eq!(result.metadata["enhanced"], true);
        let (system, user) = &adapter.prompts_for("t/high")[0];
        assert!(system.contains("initialCode"));
        assert!(user.contains("\"initialCode\": \"draft\""));

        let adapter = Arc::new(ScriptedAdapter::default().ok("t/mid", 0, "draft").fail("t/high", 0));
        let result = engine(adapter)
            .execute(Strategy::Collaborative, &task(), ExecutionContext::new(), &names(&["t/mid", "t/high"]))
            .await
            .unwrap();

        assert_eq!(result.primary_result, "draft");
        assert_eq!(result.model_responses.len(), 2);
        assert_eq!(result.metadata["enhanced"], false);
    }

    #[tokio::test]
    async fn test_collaborative_generator_failure() {
        let adapter = Arc::new(ScriptedAdapter::default().fail("t/mid", 0));
        let err = engine(adapter)
            .execute(Strategy::Collaborative, &task(), ExecutionContext::new(), &names(&["t/mid", "t/high"]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PrimaryModelFailed { ref model, .. } if model == "t/mid"));
        assert_eq!(err.responses().len(), 1);
    }

    #[tokio::test]
    async fn test_collaborative_degrades_with_one_candidate() {
        let adapter = Arc::new(ScriptedAdapter::default().ok("t/mid", 0, "solo"));
        let result = engine(adapter)
            .execute(Strategy::Collaborative, &task(), ExecutionContext::new(), &names(&["t/mid"]))
            .await
            .unwrap();

        assert_eq!(result.strategy_used, Strategy::Sequential);
        assert_eq!(result.metadata["degraded_from"], "collaborative");
        assert_eq!(result.primary_result, "solo");
    }

    #[tokio::test]
    async fn test_hierarchical_roles_and_quality() {
        let adapter = Arc::new(
            ScriptedAdapter::default()
                .ok("t/mid", 0, "base")
                .ok("t/a11y", 0, "accessible")
                .ok("t/perf", 0, "fast"),
        );
        let engine = engine(adapter.clone());

        let result = engine
            .execute(
                Strategy::Hierarchical,
                &task(),
                ExecutionContext::new(),
                &names(&["t/mid", "t/a11y", "t/perf"]),
            )
            .await
            .unwrap();

        // Both assistants exceed the threshold; the last one holds the result
        assert_eq!(result.primary_result, "fast");
        assert_eq!(result.metadata["primary_model"], "t/mid");
        assert_eq!(result.metadata["assistant_count"], 2);
        // 0.8 + 0.1 × (0.9 + 0.9)
        assert!((result.quality_score - 0.98).abs() < 1e-9);
        assert!((result.confidence - 0.9).abs() < 1e-9);

        let (a11y_system, a11y_user) = &adapter.prompts_for("t/a11y")[0];
        assert!(a11y_system.contains("accessibility"));
        assert!(a11y_user.contains("\"primaryResult\": \"base\""));
        let (perf_system, _) = &adapter.prompts_for("t/perf")[0];
        assert!(perf_system.contains("performance"));
    }

    #[tokio::test]
    async fn test_hierarchical_primary_failure_skips_assistants() {
        let adapter = Arc::new(ScriptedAdapter::default().fail("t/mid", 0).ok("t/a11y", 0, "x"));
        let engine = engine(adapter.clone());

        let err = engine
            .execute(Strategy::Hierarchical, &task(), ExecutionContext::new(), &names(&["t/mid", "t/a11y"]))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "E201");
        assert!(adapter.prompts_for("t/a11y").is_empty());
    }
}
