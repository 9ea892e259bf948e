//! Rolling per-model performance statistics
//!
//! Every model invocation, successful or not, is recorded here. The router can
//! optionally consult these statistics when ranking candidates. Statistics
//! live in memory for the lifetime of the tracker and are never pruned.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics for one model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    /// Total number of invocations
    pub total_executions: u64,
    /// Number of successful invocations
    pub successful_executions: u64,
    /// Mean confidence over successful invocations
    pub average_confidence: f64,
    /// Mean execution time in seconds over successful invocations
    pub average_execution_time: f64,
    /// When the model was last invoked
    pub last_execution: Option<DateTime<Utc>>,
}

impl PerformanceRecord {
    /// Fold one observation into the record
    fn update(&mut self, success: bool, confidence: f64, execution_time: Duration) {
        self.total_executions += 1;
        self.last_execution = Some(Utc::now());

        if success {
            self.successful_executions += 1;

            // Online mean over successes only
            let n = self.successful_executions as f64;
            self.average_confidence += (confidence - self.average_confidence) / n;
            self.average_execution_time +=
                (execution_time.as_secs_f64() - self.average_execution_time) / n;
        }
    }

    /// Get the success rate (0.0 when the model has never run)
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            return 0.0;
        }
        self.successful_executions as f64 / self.total_executions as f64
    }

    /// Number of failed invocations
    pub fn failed_executions(&self) -> u64 {
        self.total_executions - self.successful_executions
    }
}

/// Shared store of per-model statistics
///
/// Safe to share across concurrently running strategies; each `record` call
/// is O(1) under a single write lock.
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    records: Arc<RwLock<HashMap<String, PerformanceRecord>>>,
}

impl PerformanceTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one model invocation
    ///
    /// A poisoned lock is recovered so no observation is dropped.
    pub fn record(&self, model_name: &str, success: bool, confidence: f64, execution_time: Duration) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records
            .entry(model_name.to_string())
            .or_default()
            .update(success, confidence, execution_time);
    }

    /// Statistics for a model (zero-valued when never recorded)
    pub fn stats(&self, model_name: &str) -> PerformanceRecord {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of all statistics
    pub fn all(&self) -> HashMap<String, PerformanceRecord> {
        self.records.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of models with at least one recorded execution
    pub fn tracked_models(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
