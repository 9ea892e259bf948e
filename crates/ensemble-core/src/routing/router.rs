//! Task Router - capability-filtered candidate ranking
//!
//! Combines the static routing table, caller preferences and the model
//! registry into an ordered candidate list. Ranking can optionally lean on
//! recorded performance statistics.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::types::{RoutingTable, TaskSpec};
use crate::config::RoutingConfig;
use crate::performance::PerformanceTracker;
use crate::registry::ModelRegistry;

/// Bonus per required capability a model covers
const CAPABILITY_BONUS: f64 = 0.1;

/// Hard ceiling on candidates handed to the engine
pub const MAX_CANDIDATES: usize = 3;

/// Scores closer than this rank as equal
pub const SCORE_EPSILON: f64 = 1e-9;

/// Integer ranking key so float noise cannot split an exact tie
fn score_key(score: f64) -> i64 {
    (score / SCORE_EPSILON).round() as i64
}

/// Configuration for the task router
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum number of candidates returned (never more than [`MAX_CANDIDATES`])
    pub max_candidates: usize,
    /// Whether recorded statistics adjust the ranking
    pub use_performance_history: bool,
    /// Weight of the success-rate adjustment
    pub history_weight: f64,
    /// Minimum recorded executions before statistics are trusted
    pub min_samples: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_candidates: MAX_CANDIDATES,
            use_performance_history: false,
            history_weight: 0.2,
            min_samples: 5,
        }
    }
}

impl From<&RoutingConfig> for RouterConfig {
    fn from(config: &RoutingConfig) -> Self {
        Self {
            max_candidates: config.max_candidates,
            use_performance_history: config.use_performance_history,
            history_weight: config.history_weight,
            min_samples: config.min_samples,
        }
    }
}

/// A model that survived filtering, with its routing score
#[derive(Debug, Clone, Serialize)]
pub struct RankedCandidate {
    /// Model name
    pub model: String,
    /// Routing score (higher is better)
    pub score: f64,
    /// Number of required capabilities covered
    pub capability_overlap: usize,
}

/// Selects and ranks candidate models for a task
pub struct TaskRouter {
    config: RouterConfig,
    registry: Arc<ModelRegistry>,
    tracker: Option<Arc<PerformanceTracker>>,
}

impl TaskRouter {
    /// Create a router over a registry with default configuration
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            config: RouterConfig::default(),
            registry,
            tracker: None,
        }
    }

    /// Set the router configuration
    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the performance tracker consulted when history is enabled
    pub fn with_tracker(mut self, tracker: Arc<PerformanceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Get the current configuration
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Ordered candidate model names, at most `max_candidates` long
    pub fn select_models(&self, task: &TaskSpec, table: &RoutingTable) -> Vec<String> {
        self.rank(task, table)
            .into_iter()
            .map(|c| c.model)
            .collect()
    }

    /// Ranked candidates with their scores
    pub fn rank(&self, task: &TaskSpec, table: &RoutingTable) -> Vec<RankedCandidate> {
        // Table affinities first, then caller preferences, first-seen order
        let mut seen: Vec<&str> = Vec::new();
        for name in table
            .route(task.task_type)
            .iter()
            .chain(task.preferred_models.iter())
        {
            if !seen.contains(&name.as_str()) {
                seen.push(name.as_str());
            }
        }

        let mut ranked: Vec<(usize, RankedCandidate)> = Vec::new();
        for name in seen {
            let spec = match self.registry.get(name) {
                Ok(spec) => spec,
                Err(_) => {
                    warn!(model = %name, task_type = %task.task_type, "Skipping unregistered model");
                    continue;
                }
            };

            let overlap = spec.capability_overlap(&task.required_capabilities);
            if overlap == 0 {
                debug!(model = %name, "Dropping model with no matching capability");
                continue;
            }

            let score = spec.quality_score
                + CAPABILITY_BONUS * overlap as f64
                + self.history_adjustment(name);

            let position = self.registry.position(name).unwrap_or(usize::MAX);
            ranked.push((
                position,
                RankedCandidate {
                    model: name.to_string(),
                    score,
                    capability_overlap: overlap,
                },
            ));
        }

        ranked.sort_by_key(|(position, c)| (std::cmp::Reverse(score_key(c.score)), *position));
        ranked.truncate(self.config.max_candidates.min(MAX_CANDIDATES));

        let ranked: Vec<RankedCandidate> = ranked.into_iter().map(|(_, c)| c).collect();

        debug!(
            task_type = %task.task_type,
            candidates = ?ranked.iter().map(|c| c.model.as_str()).collect::<Vec<_>>(),
            "Ranked candidate models"
        );

        ranked
    }

    /// Success-rate adjustment for models with enough history
    fn history_adjustment(&self, model: &str) -> f64 {
        if !self.config.use_performance_history {
            return 0.0;
        }
        let Some(tracker) = &self.tracker else {
            return 0.0;
        };

        let stats = tracker.stats(model);
        if stats.total_executions < self.config.min_samples {
            return 0.0;
        }
        self.config.history_weight * (stats.success_rate() - 0.5)
    }
}
