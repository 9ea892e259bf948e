//! Orchestrator facade
//!
//! Ties the registry, router, execution engine and performance tracker
//! together behind `orchestrate(task, context, strategy)`. All collaborators
//! are constructed by the caller (or defaulted by the builder) and injected;
//! nothing here is global.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::{ExecutionContext, ExecutionEngine, OrchestrationResult, PromptBuilder, Strategy};
use crate::error::{Error, Result};
use crate::performance::PerformanceTracker;
use crate::provider::ProviderAdapter;
use crate::registry::ModelRegistry;
use crate::routing::{RankedCandidate, RouterConfig, RoutingTable, TaskRouter, TaskSpec};

/// Aggregate view over the retained execution history
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySummary {
    /// Number of retained results
    pub total_runs: usize,
    /// Mean quality score
    pub average_quality: f64,
    /// Mean confidence
    pub average_confidence: f64,
    /// Mean total execution time in seconds
    pub average_execution_time: f64,
    /// Estimated spend across retained results
    pub total_cost_usd: f64,
    /// Runs per strategy actually used
    pub by_strategy: BTreeMap<String, usize>,
}

/// Builder for [`Orchestrator`]
#[derive(Default)]
pub struct OrchestratorBuilder {
    registry: Option<ModelRegistry>,
    routing_table: Option<RoutingTable>,
    adapter: Option<Arc<dyn ProviderAdapter>>,
    tracker: Option<Arc<PerformanceTracker>>,
    prompts: Option<Arc<dyn PromptBuilder>>,
    config: Option<Config>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model registry (defaults to the built-in model table)
    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Static task-type affinities (defaults to the built-in table)
    pub fn routing_table(mut self, table: RoutingTable) -> Self {
        self.routing_table = Some(table);
        self
    }

    /// Provider adapter every invocation goes through (required)
    pub fn adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Share a tracker with other orchestrators
    pub fn tracker(mut self, tracker: Arc<PerformanceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Replace the default prompt builder
    pub fn prompt_builder(mut self, prompts: Arc<dyn PromptBuilder>) -> Self {
        self.prompts = Some(prompts);
        self
    }

    /// Orchestration and routing settings
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let adapter = self
            .adapter
            .ok_or_else(|| Error::ConfigError("a provider adapter is required".to_string()))?;
        let config = self.config.unwrap_or_default();
        let default_strategy = config.orchestration.strategy()?;

        let registry = Arc::new(self.registry.unwrap_or_else(ModelRegistry::with_defaults));
        let tracker = self.tracker.unwrap_or_default();

        let router = TaskRouter::new(registry.clone())
            .with_config(RouterConfig::from(&config.routing))
            .with_tracker(tracker.clone());

        let mut engine = ExecutionEngine::new(registry.clone(), adapter, tracker.clone())
            .with_assistant_threshold(config.orchestration.assistant_override_threshold);
        if let Some(prompts) = self.prompts {
            engine = engine.with_prompt_builder(prompts);
        }

        Ok(Orchestrator {
            registry,
            routing_table: self.routing_table.unwrap_or_else(RoutingTable::defaults),
            router,
            engine,
            tracker,
            history: RwLock::new(VecDeque::new()),
            history_limit: config.orchestration.history_limit,
            default_strategy,
        })
    }
}

/// Entry point for running tasks across multiple backends
pub struct Orchestrator {
    registry: Arc<ModelRegistry>,
    routing_table: RoutingTable,
    router: TaskRouter,
    engine: ExecutionEngine,
    tracker: Arc<PerformanceTracker>,
    history: RwLock<VecDeque<OrchestrationResult>>,
    history_limit: usize,
    default_strategy: Strategy,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("engine", &self.engine)
            .field("default_strategy", &self.default_strategy)
            .field("history_limit", &self.history_limit)
            .finish()
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Validate, route and execute one task
    ///
    /// Fails fast with [`Error::NoEligibleModel`] when routing yields no
    /// candidates; no model is invoked in that case.
    pub async fn orchestrate(
        &self,
        task: &TaskSpec,
        context: ExecutionContext,
        strategy: Strategy,
    ) -> Result<OrchestrationResult> {
        task.validate()?;

        let candidates = self.router.select_models(task, &self.routing_table);
        if candidates.is_empty() {
            return Err(Error::NoEligibleModel(task.task_type.to_string()));
        }
        debug!(task_type = %task.task_type, candidates = ?candidates, "Routed task");

        let result = self.engine.execute(strategy, task, context, &candidates).await?;

        if !result.meets_threshold(task.quality_threshold) {
            warn!(
                quality = result.quality_score,
                threshold = task.quality_threshold,
                strategy = %result.strategy_used,
                "Result below quality threshold"
            );
        }

        self.remember(&result);
        Ok(result)
    }

    /// Orchestrate with the configured default strategy
    pub async fn orchestrate_default(
        &self,
        task: &TaskSpec,
        context: ExecutionContext,
    ) -> Result<OrchestrationResult> {
        self.orchestrate(task, context, self.default_strategy).await
    }

    /// Ranked candidates with scores, without executing anything
    pub fn rank(&self, task: &TaskSpec) -> Result<Vec<RankedCandidate>> {
        task.validate()?;
        Ok(self.router.rank(task, &self.routing_table))
    }

    pub fn default_strategy(&self) -> Strategy {
        self.default_strategy
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    /// Retained results, oldest first
    pub fn history(&self) -> Vec<OrchestrationResult> {
        self.history
            .read()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Aggregates over the retained history
    pub fn summary(&self) -> HistorySummary {
        let Ok(history) = self.history.read() else {
            return HistorySummary::default();
        };
        if history.is_empty() {
            return HistorySummary::default();
        }

        let n = history.len() as f64;
        let mut summary = HistorySummary {
            total_runs: history.len(),
            ..Default::default()
        };
        let mut total_time = Duration::ZERO;

        for result in history.iter() {
            summary.average_quality += result.quality_score / n;
            summary.average_confidence += result.confidence / n;
            summary.total_cost_usd += result.total_cost_usd();
            total_time += result.total_execution_time;
            *summary
                .by_strategy
                .entry(result.strategy_used.to_string())
                .or_default() += 1;
        }
        summary.average_execution_time = total_time.as_secs_f64() / n;

        summary
    }

    /// Drop all retained results
    pub fn clear_history(&self) {
        if let Ok(mut history) = self.history.write() {
            history.clear();
        }
    }

    fn remember(&self, result: &OrchestrationResult) {
        if self.history_limit == 0 {
            return;
        }
        if let Ok(mut history) = self.history.write() {
            while history.len() >= self.history_limit {
                history.pop_front();
            }
            history.push_back(result.clone());
            info!(id = %result.id, retained = history.len(), "Recorded orchestration result");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::DryRunAdapter;
    use crate::registry::Capability;
    use crate::routing::TaskType;

    fn orchestrator(config: Config) -> Orchestrator {
        Orchestrator::builder()
            .adapter(Arc::new(DryRunAdapter::new()))
            .config(config)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_adapter() {
        let err = Orchestrator::builder().build().unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_builder_rejects_unknown_default_strategy() {
        let mut config = Config::default();
        config.orchestration.default_strategy = "majority-vote".to_string();

        let err = Orchestrator::builder()
            .adapter(Arc::new(DryRunAdapter::new()))
            .config(config)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedStrategy(_)));
    }

    #[tokio::test]
    async fn test_orchestrate_records_history() {
        let orchestrator = orchestrator(Config::default());
        let task = TaskSpec::new(TaskType::ComponentGeneration, "Build a card");

        let result = orchestrator
            .orchestrate(&task, ExecutionContext::new(), Strategy::Parallel)
            .await
            .unwrap();

        assert!(result.primary_result.contains("would answer: Build a card"));
        assert_eq!(orchestrator.history().len(), 1);

        let summary = orchestrator.summary();
        assert_eq!(summary.total_runs, 1);
        assert_eq!(summary.by_strategy.get("parallel"), Some(&1));
        assert!((summary.average_quality - result.quality_score).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let mut config = Config::default();
        config.orchestration.history_limit = 2;
        let orchestrator = orchestrator(config);
        let task = TaskSpec::new(TaskType::Documentation, "Document the API");

        let mut ids = Vec::new();
        for _ in 0..3 {
            let result = orchestrator
                .orchestrate(&task, ExecutionContext::new(), Strategy::Sequential)
                .await
                .unwrap();
            ids.push(result.id);
        }

        let history = orchestrator.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, ids[1]);
        assert_eq!(history[1].id, ids[2]);

        orchestrator.clear_history();
        assert!(orchestrator.history().is_empty());
        assert_eq!(orchestrator.summary(), HistorySummary::default());
    }

    #[tokio::test]
    async fn test_invalid_task_rejected_before_routing() {
        let orchestrator = orchestrator(Config::default());
        let task = TaskSpec::new(TaskType::CodeReview, "Review").with_capabilities(Vec::<Capability>::new());

        let err = orchestrator
            .orchestrate(&task, ExecutionContext::new(), Strategy::Parallel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTask(_)));
        assert_eq!(orchestrator.tracker().tracked_models(), 0);
    }
}
