//! Model registry
//!
//! Static-at-runtime catalog of the backends Ensemble can dispatch to. Each
//! entry is a [`ModelSpec`] describing what the model is good at and what it
//! costs. The registry is populated once at startup and shared read-only
//! afterwards, so it needs no locking.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A task category a model is suited for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    CodeGeneration,
    CodeReview,
    AccessibilityReview,
    PerformanceReview,
    DesignAnalysis,
    Refactoring,
    Documentation,
    Testing,
}

impl Capability {
    /// All known capabilities, in declaration order
    pub const ALL: [Capability; 8] = [
        Self::CodeGeneration,
        Self::CodeReview,
        Self::AccessibilityReview,
        Self::PerformanceReview,
        Self::DesignAnalysis,
        Self::Refactoring,
        Self::Documentation,
        Self::Testing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeGeneration => "code-generation",
            Self::CodeReview => "code-review",
            Self::AccessibilityReview => "accessibility-review",
            Self::PerformanceReview => "performance-review",
            Self::DesignAnalysis => "design-analysis",
            Self::Refactoring => "refactoring",
            Self::Documentation => "documentation",
            Self::Testing => "testing",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .find(|c| c.as_str() == normalized)
            .copied()
            .ok_or_else(|| format!("Unknown capability: {}", s))
    }
}

/// Description of one backend model
///
/// Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model identifier (e.g., "anthropic/claude-sonnet-4-20250514")
    pub name: String,
    /// Provider that serves the model
    pub provider: String,
    /// Task categories this model handles
    pub capabilities: Vec<Capability>,
    /// What the model is known to do well
    pub strengths: Vec<String>,
    /// Known weak spots
    pub weaknesses: Vec<String>,
    /// Free-text specialization tags
    pub specializations: Vec<String>,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    /// Sampling temperature
    pub temperature: f32,
    /// Blended cost per token in USD
    pub cost_per_token: f64,
    /// Typical round-trip latency
    pub latency_estimate: Duration,
    /// Static quality prior in [0, 1]
    pub quality_score: f64,
}

impl ModelSpec {
    /// Create a new model spec with neutral defaults
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            capabilities: Vec::new(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            specializations: Vec::new(),
            max_tokens: 4096,
            temperature: 0.7,
            cost_per_token: 0.000_002,
            latency_estimate: Duration::from_secs(2),
            quality_score: 0.7,
        }
    }

    /// Set capabilities (duplicates are dropped)
    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.clear();
        for capability in capabilities {
            if !self.capabilities.contains(&capability) {
                self.capabilities.push(capability);
            }
        }
        self
    }

    /// Set strengths and weaknesses
    pub fn with_profile(mut self, strengths: &[&str], weaknesses: &[&str]) -> Self {
        self.strengths = strengths.iter().map(|s| s.to_string()).collect();
        self.weaknesses = weaknesses.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set specialization tags
    pub fn with_specializations(mut self, tags: &[&str]) -> Self {
        self.specializations = tags.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set generation parameters
    pub fn with_generation(mut self, max_tokens: usize, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Set cost per token
    pub fn with_cost_per_token(mut self, cost: f64) -> Self {
        self.cost_per_token = cost.max(0.0);
        self
    }

    /// Set latency estimate
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_estimate = latency;
        self
    }

    /// Set quality prior
    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality_score = quality.clamp(0.0, 1.0);
        self
    }

    /// Check whether this model declares a capability
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Number of required capabilities this model covers
    pub fn capability_overlap(&self, required: &[Capability]) -> usize {
        required.iter().filter(|c| self.has_capability(**c)).count()
    }

    /// Fraction of required capabilities this model covers
    pub fn capability_match_ratio(&self, required: &[Capability]) -> f64 {
        if required.is_empty() {
            return 0.0;
        }
        self.capability_overlap(required) as f64 / required.len() as f64
    }

    /// Estimate cost for a given token count
    pub fn estimate_cost(&self, total_tokens: u32) -> f64 {
        total_tokens as f64 * self.cost_per_token
    }
}

/// Registry of available models
///
/// Registration order is preserved; routing uses it as a stable tie-break.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelSpec>,
    index: HashMap<String, usize>,
}

impl ModelRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in model table
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        for spec in default_models() {
            // The built-in table has unique names
            let _ = registry.register(spec);
        }

        registry
    }

    /// Register a model
    pub fn register(&mut self, spec: ModelSpec) -> Result<()> {
        if self.index.contains_key(&spec.name) {
            return Err(Error::ModelAlreadyRegistered(spec.name));
        }
        self.index.insert(spec.name.clone(), self.models.len());
        self.models.push(spec);
        Ok(())
    }

    /// Get a model by name
    pub fn get(&self, name: &str) -> Result<&ModelSpec> {
        self.index
            .get(name)
            .map(|&i| &self.models[i])
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    /// Position of a model in registration order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// All models in registration order
    pub fn all(&self) -> &[ModelSpec] {
        &self.models
    }

    /// Models that declare the given capability
    pub fn with_capability(&self, capability: Capability) -> Vec<&ModelSpec> {
        self.models
            .iter()
            .filter(|m| m.has_capability(capability))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Built-in model table
fn default_models() -> Vec<ModelSpec> {
    use Capability::*;

    vec![
        // Claude Sonnet 4 - balanced quality/cost
        ModelSpec::new("anthropic/claude-sonnet-4-20250514", "anthropic")
            .with_capabilities([CodeGeneration, CodeReview, AccessibilityReview, Refactoring, Documentation])
            .with_profile(
                &["component architecture", "typed code", "accessibility"],
                &["cost on long outputs"],
            )
            .with_specializations(&["react", "typescript"])
            .with_generation(8192, 0.3)
            .with_cost_per_token(0.000_009)
            .with_latency(Duration::from_millis(2500))
            .with_quality(0.9),
        // Claude Haiku - fast and cheap
        ModelSpec::new("anthropic/claude-3-5-haiku-latest", "anthropic")
            .with_capabilities([CodeGeneration, CodeReview, Documentation])
            .with_profile(&["speed", "short edits"], &["complex multi-file changes"])
            .with_specializations(&["quick-fixes"])
            .with_generation(4096, 0.3)
            .with_cost_per_token(0.000_002_4)
            .with_latency(Duration::from_millis(800))
            .with_quality(0.75),
        // Claude Opus - highest quality
        ModelSpec::new("anthropic/claude-opus-4-20250514", "anthropic")
            .with_capabilities([CodeGeneration, CodeReview, DesignAnalysis, PerformanceReview, Refactoring])
            .with_profile(&["deep reasoning", "architecture"], &["latency", "cost"])
            .with_specializations(&["architecture", "performance"])
            .with_generation(8192, 0.2)
            .with_cost_per_token(0.000_045)
            .with_latency(Duration::from_secs(6))
            .with_quality(0.95),
        // GPT-4o - general purpose
        ModelSpec::new("openai/gpt-4o", "openai")
            .with_capabilities([CodeGeneration, DesignAnalysis, AccessibilityReview, Testing])
            .with_profile(&["design critique", "visual reasoning"], &["verbose output"])
            .with_specializations(&["ui-design", "testing"])
            .with_generation(4096, 0.4)
            .with_cost_per_token(0.000_006_25)
            .with_latency(Duration::from_secs(2))
            .with_quality(0.85),
        // GPT-4o-mini - fast and cheap
        ModelSpec::new("openai/gpt-4o-mini", "openai")
            .with_capabilities([CodeGeneration, Documentation, Testing])
            .with_profile(&["speed", "boilerplate"], &["subtle bugs"])
            .with_specializations(&["boilerplate"])
            .with_generation(4096, 0.4)
            .with_cost_per_token(0.000_000_375)
            .with_latency(Duration::from_millis(700))
            .with_quality(0.7),
        // Gemini - long context analysis
        ModelSpec::new("google/gemini-2.5-pro", "google")
            .with_capabilities([DesignAnalysis, PerformanceReview, CodeReview, AccessibilityReview])
            .with_profile(&["long context", "performance analysis"], &["strict formatting"])
            .with_specializations(&["performance", "large-codebases"])
            .with_generation(8192, 0.3)
            .with_cost_per_token(0.000_005_6)
            .with_latency(Duration::from_secs(3))
            .with_quality(0.88),
    ]
}
