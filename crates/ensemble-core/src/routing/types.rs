//! Types describing a unit of work and the default task-to-model affinities

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::registry::Capability;

/// Category of generative work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    /// Generate a new UI component
    ComponentGeneration,
    /// Review existing code
    CodeReview,
    /// Audit markup for accessibility issues
    AccessibilityAudit,
    /// Critique a design or layout
    DesignAnalysis,
    /// Find and fix performance problems
    PerformanceOptimization,
    /// Restructure existing code
    Refactoring,
    /// Write documentation
    Documentation,
    /// Generate tests
    TestGeneration,
}

impl TaskType {
    pub const ALL: [TaskType; 8] = [
        Self::ComponentGeneration,
        Self::CodeReview,
        Self::AccessibilityAudit,
        Self::DesignAnalysis,
        Self::PerformanceOptimization,
        Self::Refactoring,
        Self::Documentation,
        Self::TestGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ComponentGeneration => "component-generation",
            Self::CodeReview => "code-review",
            Self::AccessibilityAudit => "accessibility-audit",
            Self::DesignAnalysis => "design-analysis",
            Self::PerformanceOptimization => "performance-optimization",
            Self::Refactoring => "refactoring",
            Self::Documentation => "documentation",
            Self::TestGeneration => "test-generation",
        }
    }

    /// Capability a task of this type needs when the caller names none
    pub fn default_capability(&self) -> Capability {
        match self {
            Self::ComponentGeneration => Capability::CodeGeneration,
            Self::CodeReview => Capability::CodeReview,
            Self::AccessibilityAudit => Capability::AccessibilityReview,
            Self::DesignAnalysis => Capability::DesignAnalysis,
            Self::PerformanceOptimization => Capability::PerformanceReview,
            Self::Refactoring => Capability::Refactoring,
            Self::Documentation => Capability::Documentation,
            Self::TestGeneration => Capability::Testing,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .find(|t| t.as_str() == normalized)
            .copied()
            .ok_or_else(|| format!("Unknown task type: {}", s))
    }
}

/// A unit of work to orchestrate
///
/// Created per orchestration call and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Category of work
    pub task_type: TaskType,
    /// Human-readable description of what to produce
    pub description: String,
    /// Capabilities a candidate must cover at least one of
    pub required_capabilities: Vec<Capability>,
    /// Models the caller would like considered, in order
    pub preferred_models: Vec<String>,
    /// Upper bound for each model invocation
    pub max_execution_time: Duration,
    /// Minimum acceptable quality score (0.0 to 1.0)
    pub quality_threshold: f64,
    /// Retries a caller may attempt; the engine itself never retries
    pub retry_attempts: u32,
}

impl TaskSpec {
    /// Create a new task spec requiring the task type's default capability
    pub fn new(task_type: TaskType, description: impl Into<String>) -> Self {
        Self {
            task_type,
            description: description.into(),
            required_capabilities: vec![task_type.default_capability()],
            preferred_models: Vec::new(),
            max_execution_time: Duration::from_secs(60),
            quality_threshold: 0.7,
            retry_attempts: 1,
        }
    }

    /// Replace the required capabilities
    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.required_capabilities = capabilities.into_iter().collect();
        self
    }

    /// Set preferred models
    pub fn with_preferred_models(mut self, models: Vec<String>) -> Self {
        self.preferred_models = models;
        self
    }

    /// Set per-invocation timeout
    pub fn with_max_execution_time(mut self, limit: Duration) -> Self {
        self.max_execution_time = limit;
        self
    }

    /// Set quality threshold
    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    /// Set retry attempts
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Reject specs the router and engine cannot act on
    pub fn validate(&self) -> Result<()> {
        if self.required_capabilities.is_empty() {
            return Err(Error::InvalidTask(
                "at least one required capability is needed".to_string(),
            ));
        }
        if self.max_execution_time.is_zero() {
            return Err(Error::InvalidTask(
                "max execution time must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(Error::InvalidTask(format!(
                "quality threshold {} is outside [0, 1]",
                self.quality_threshold
            )));
        }
        Ok(())
    }
}

/// Default affinities from task type to model names
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: HashMap<TaskType, Vec<String>>,
}

impl RoutingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table matching the built-in registry
    pub fn defaults() -> Self {
        const SONNET: &str = "anthropic/claude-sonnet-4-20250514";
        const HAIKU: &str = "anthropic/claude-3-5-haiku-latest";
        const OPUS: &str = "anthropic/claude-opus-4-20250514";
        const GPT4O: &str = "openai/gpt-4o";
        const GPT4O_MINI: &str = "openai/gpt-4o-mini";
        const GEMINI: &str = "google/gemini-2.5-pro";

        Self::new()
            .with_route(TaskType::ComponentGeneration, &[SONNET, GPT4O, OPUS, HAIKU])
            .with_route(TaskType::CodeReview, &[OPUS, SONNET, GEMINI, HAIKU])
            .with_route(TaskType::AccessibilityAudit, &[SONNET, GPT4O, GEMINI])
            .with_route(TaskType::DesignAnalysis, &[GPT4O, GEMINI, OPUS])
            .with_route(TaskType::PerformanceOptimization, &[OPUS, GEMINI])
            .with_route(TaskType::Refactoring, &[SONNET, OPUS])
            .with_route(TaskType::Documentation, &[HAIKU, GPT4O_MINI, SONNET])
            .with_route(TaskType::TestGeneration, &[GPT4O, GPT4O_MINI])
    }

    /// Set the route for a task type
    pub fn with_route(mut self, task_type: TaskType, models: &[&str]) -> Self {
        self.set_route(task_type, models.iter().map(|m| m.to_string()).collect());
        self
    }

    /// Replace the route for a task type
    pub fn set_route(&mut self, task_type: TaskType, models: Vec<String>) {
        self.routes.insert(task_type, models);
    }

    /// Models routed to a task type (empty when unrouted)
    pub fn route(&self, task_type: TaskType) -> &[String] {
        self.routes
            .get(&task_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
