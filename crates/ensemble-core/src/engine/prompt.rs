//! Prompt construction for model invocations
//!
//! Strategies only add keys to the [`ExecutionContext`]; turning that
//! context into a system/user prompt pair is the job of a [`PromptBuilder`].

use std::fmt::Write as _;

use super::types::{ExecutionContext, context_keys};
use crate::registry::ModelSpec;
use crate::routing::TaskSpec;

/// Role a strategy assigns to a model through the `role` context key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Collaborative second stage: refine `initialCode`
    Enhancer,
    /// Hierarchical assistant with accessibility-review capability
    AccessibilityReviewer,
    /// Hierarchical assistant with performance-review capability
    PerformanceReviewer,
    /// Any other hierarchical assistant
    Reviewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enhancer => "enhancer",
            Self::AccessibilityReviewer => "accessibility-reviewer",
            Self::PerformanceReviewer => "performance-reviewer",
            Self::Reviewer => "reviewer",
        }
    }

    /// Parse a role from its context value
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "enhancer" => Some(Self::Enhancer),
            "accessibility-reviewer" => Some(Self::AccessibilityReviewer),
            "performance-reviewer" => Some(Self::PerformanceReviewer),
            "reviewer" => Some(Self::Reviewer),
            _ => None,
        }
    }

    /// Instructions appended to the system prompt
    pub fn instructions(&self) -> &'static str {
        match self {
            Self::Enhancer => {
                "Another model produced the initial solution under `initialCode`. \
                 Improve it: fix defects, tighten types and keep what already works. \
                 Return the complete improved solution."
            }
            Self::AccessibilityReviewer => {
                "Review the solution under `primaryResult` for accessibility. \
                 Return an improved version with proper labels, roles and keyboard support."
            }
            Self::PerformanceReviewer => {
                "Review the solution under `primaryResult` for performance. \
                 Return an improved version that avoids needless work and re-renders."
            }
            Self::Reviewer => {
                "Review the solution under `primaryResult` and return an improved version."
            }
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the prompt pair handed to a provider adapter
pub trait PromptBuilder: Send + Sync {
    fn system_prompt(&self, task: &TaskSpec, model: &ModelSpec, context: &ExecutionContext) -> String;

    fn user_prompt(&self, task: &TaskSpec, model: &ModelSpec, context: &ExecutionContext) -> String;
}

/// Default prompt layout
///
/// The user prompt always starts with the task description; the context is
/// appended as pretty-printed JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPromptBuilder;

impl PromptBuilder for DefaultPromptBuilder {
    fn system_prompt(&self, task: &TaskSpec, model: &ModelSpec, context: &ExecutionContext) -> String {
        let mut prompt = format!(
            "You are {}, working on a {} task.",
            model.name, task.task_type
        );

        if !task.required_capabilities.is_empty() {
            let capabilities = task
                .required_capabilities
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(prompt, " Required capabilities: {}.", capabilities);
        }

        if !model.strengths.is_empty() {
            let _ = write!(prompt, " Lean on your strengths: {}.", model.strengths.join(", "));
        }

        if let Some(role) = context.get_str(context_keys::ROLE).and_then(Role::parse) {
            prompt.push_str("\n\n");
            prompt.push_str(role.instructions());
        }

        if context.contains_key(context_keys::PREVIOUS_ATTEMPTS) {
            prompt.push_str(
                "\n\nEarlier attempts by other models are listed under `previousAttempts`. \
                 Do better than the best of them.",
            );
        }

        prompt
    }

    fn user_prompt(&self, task: &TaskSpec, _model: &ModelSpec, context: &ExecutionContext) -> String {
        if context.is_empty() {
            return task.description.clone();
        }

        let rendered = serde_json::to_string_pretty(context.as_map()).unwrap_or_default();
        format!("{}\n\nContext:\n```json\n{}\n```", task.description, rendered)
    }
}
