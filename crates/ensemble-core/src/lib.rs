//! Ensemble Core Library
//!
//! This crate provides the multi-backend orchestration core for Ensemble:
//! - Model registry (capabilities, cost, latency and quality priors)
//! - Task routing (capability matching and candidate ranking)
//! - Response scoring
//! - Rolling per-model performance statistics
//! - Provider adapters (OpenRouter, dry-run)
//! - Execution engine with five dispatch strategies
//! - Orchestrator facade with in-memory execution history

pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod performance;
pub mod provider;
pub mod registry;
pub mod routing;
pub mod scoring;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::engine::{ExecutionContext, ModelResponse, OrchestrationResult, Strategy};
    pub use crate::error::{Error, Result};
    pub use crate::orchestrator::{Orchestrator, OrchestratorBuilder};
    pub use crate::registry::{Capability, ModelRegistry, ModelSpec};
    pub use crate::routing::{TaskSpec, TaskType};
}
