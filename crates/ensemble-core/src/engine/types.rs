//! Types produced and consumed by the execution engine

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Error;
use crate::provider::TokenUsage;
use crate::routing::TaskType;

/// Dispatch strategy over a ranked candidate list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One model at a time, each seeing earlier attempts
    Sequential,
    /// All models at once, highest confidence wins
    Parallel,
    /// Parallel, then a weighted composite picks the winner
    Competitive,
    /// Generator followed by an enhancer
    Collaborative,
    /// Primary model reviewed by capability-specific assistants
    Hierarchical,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Self::Sequential,
        Self::Parallel,
        Self::Competitive,
        Self::Collaborative,
        Self::Hierarchical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Competitive => "competitive",
            Self::Collaborative => "collaborative",
            Self::Hierarchical => "hierarchical",
        }
    }

    /// One-line description for help output
    pub fn description(&self) -> &'static str {
        match self {
            Self::Sequential => "invoke candidates in ranked order, keep the best response",
            Self::Parallel => "invoke all candidates concurrently, keep the most confident",
            Self::Competitive => "run in parallel and pick a winner by composite score",
            Self::Collaborative => "first model generates, second model refines",
            Self::Hierarchical => "primary model output reviewed by specialist assistants",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .find(|strategy| strategy.as_str() == normalized)
            .copied()
            .ok_or_else(|| Error::UnsupportedStrategy(s.to_string()))
    }
}

/// Well-known context keys the engine adds
pub mod context_keys {
    /// Array of `{model, result, confidence, success}` from earlier sequential attempts
    pub const PREVIOUS_ATTEMPTS: &str = "previousAttempts";
    /// Output of the collaborative generator
    pub const INITIAL_CODE: &str = "initialCode";
    /// Output of the hierarchical primary
    pub const PRIMARY_RESULT: &str = "primaryResult";
    /// Role assigned to the invoked model
    pub const ROLE: &str = "role";

    /// Keys only the engine may write; callers supplying them are rejected
    pub const RESERVED: [&str; 4] = [PREVIOUS_ATTEMPTS, INITIAL_CODE, PRIMARY_RESULT, ROLE];
}

/// Opaque string-keyed context passed through to prompt construction
///
/// The engine only ever adds keys; caller-supplied keys are never removed or
/// overwritten. Callers may not supply the keys in [`context_keys::RESERVED`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext(Map<String, Value>);

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of a key, if it is a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Underlying map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// First engine-owned key present, if any
    pub fn reserved_key(&self) -> Option<&'static str> {
        context_keys::RESERVED
            .into_iter()
            .find(|key| self.0.contains_key(*key))
    }
}

impl From<Map<String, Value>> for ExecutionContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Outcome of one model invocation attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Model that was invoked
    pub model_name: String,
    /// Task type of the orchestration
    pub task_type: TaskType,
    /// Generated content (empty on failure)
    pub content: String,
    /// Confidence in [0, 1] (zero on failure)
    pub confidence: f64,
    /// Wall time of the invocation
    pub execution_time: Duration,
    /// Token accounting
    pub token_usage: TokenUsage,
    /// Estimated cost in USD
    pub cost_usd: f64,
    /// Whether the invocation succeeded
    pub success: bool,
    /// Failure description
    pub error: Option<String>,
}

impl ModelResponse {
    /// Create a successful response
    pub fn success(
        model_name: impl Into<String>,
        task_type: TaskType,
        content: impl Into<String>,
        confidence: f64,
        execution_time: Duration,
        token_usage: TokenUsage,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            task_type,
            content: content.into(),
            confidence: confidence.clamp(0.0, 1.0),
            execution_time,
            token_usage,
            cost_usd: 0.0,
            success: true,
            error: None,
        }
    }

    /// Create a failed response; content and confidence are always empty
    pub fn failure(
        model_name: impl Into<String>,
        task_type: TaskType,
        error: impl Into<String>,
        execution_time: Duration,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            task_type,
            content: String::new(),
            confidence: 0.0,
            execution_time,
            token_usage: TokenUsage::default(),
            cost_usd: 0.0,
            success: false,
            error: Some(error.into()),
        }
    }

    /// Set the estimated cost
    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = cost_usd;
        self
    }
}

/// Final outcome of one orchestration call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    /// Unique identifier
    pub id: Uuid,
    /// When the result was produced
    pub created_at: DateTime<Utc>,
    /// Winning content
    pub primary_result: String,
    /// Strategy that produced the result
    pub strategy_used: Strategy,
    /// Every attempt, successes and failures
    pub model_responses: Vec<ModelResponse>,
    /// Strategy-defined total time
    pub total_execution_time: Duration,
    /// Aggregate quality (0.0 to 1.0)
    pub quality_score: f64,
    /// Aggregate confidence (0.0 to 1.0)
    pub confidence: f64,
    /// Strategy-specific details (winner, composite score, ...)
    pub metadata: Map<String, Value>,
}

impl OrchestrationResult {
    /// Create a new result
    pub fn new(
        strategy_used: Strategy,
        primary_result: impl Into<String>,
        model_responses: Vec<ModelResponse>,
        total_execution_time: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            primary_result: primary_result.into(),
            strategy_used,
            model_responses,
            total_execution_time,
            quality_score: 0.0,
            confidence: 0.0,
            metadata: Map::new(),
        }
    }

    /// Set quality and confidence
    pub fn with_scores(mut self, quality_score: f64, confidence: f64) -> Self {
        self.quality_score = quality_score.clamp(0.0, 1.0);
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Successful attempts only
    pub fn successful_responses(&self) -> impl Iterator<Item = &ModelResponse> {
        self.model_responses.iter().filter(|r| r.success)
    }

    /// Number of failed attempts
    pub fn failure_count(&self) -> usize {
        self.model_responses.iter().filter(|r| !r.success).count()
    }

    /// Tokens consumed by every attempt
    pub fn total_tokens(&self) -> u64 {
        self.model_responses
            .iter()
            .map(|r| r.token_usage.total_tokens as u64)
            .sum()
    }

    /// Estimated cost of every attempt
    pub fn total_cost_usd(&self) -> f64 {
        self.model_responses.iter().map(|r| r.cost_usd).sum()
    }

    /// Whether the aggregate quality reaches a threshold
    pub fn meets_threshold(&self, threshold: f64) -> bool {
        self.quality_score >= threshold
    }
}
