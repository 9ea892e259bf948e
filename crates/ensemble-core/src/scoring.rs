//! Response scoring
//!
//! Confidence for a single response starts at the issuing model's static
//! quality prior and gains small fixed increments for structural signals in
//! the content. Scoring is pure: identical inputs always give identical
//! scores.

use serde::Serialize;

use crate::registry::ModelSpec;

/// A structural signal that raises confidence in a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSignal {
    /// A fenced code block
    CodeBlock,
    /// Explicit type annotations or declarations
    TypeAnnotations,
    /// Recognized state/effect idioms
    StateEffectIdioms,
    /// Accessibility attributes
    AccessibilityAttributes,
    /// Error-handling constructs
    ErrorHandling,
}

impl ContentSignal {
    pub const ALL: [ContentSignal; 5] = [
        Self::CodeBlock,
        Self::TypeAnnotations,
        Self::StateEffectIdioms,
        Self::AccessibilityAttributes,
        Self::ErrorHandling,
    ];

    /// Confidence added when the signal is present
    pub fn weight(&self) -> f64 {
        match self {
            Self::CodeBlock => 0.10,
            Self::TypeAnnotations
            | Self::StateEffectIdioms
            | Self::AccessibilityAttributes
            | Self::ErrorHandling => 0.05,
        }
    }

    fn patterns(&self) -> &'static [&'static str] {
        match self {
            Self::CodeBlock => &["```"],
            Self::TypeAnnotations => &[
                "interface ",
                "type ",
                ": string",
                ": number",
                ": boolean",
                "react.fc",
                "props>",
                "-> ",
            ],
            Self::StateEffectIdioms => &[
                "usestate",
                "useeffect",
                "usereducer",
                "usememo",
                "usecallback",
                "usecontext",
            ],
            Self::AccessibilityAttributes => &["aria-", "role=", "alt=", "tabindex", "htmlfor="],
            Self::ErrorHandling => &[
                "try {",
                "catch",
                "errorboundary",
                ".catch(",
                "result<",
                "throw new",
            ],
        }
    }

    /// Check whether the signal appears in lowercased content
    fn detect(&self, lower: &str) -> bool {
        self.patterns().iter().any(|p| lower.contains(p))
    }
}

/// Computes per-response confidence scores
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseScorer;

impl ResponseScorer {
    pub fn new() -> Self {
        Self
    }

    /// Confidence in [quality, quality + 0.3], never above 1.0
    pub fn score(&self, content: &str, model: &ModelSpec) -> f64 {
        let bonus: f64 = self.signals(content).iter().map(|s| s.weight()).sum();
        (model.quality_score + bonus).min(1.0)
    }

    /// Structural signals present in the content
    pub fn signals(&self, content: &str) -> Vec<ContentSignal> {
        let lower = content.to_lowercase();
        ContentSignal::ALL
            .iter()
            .copied()
            .filter(|s| s.detect(&lower))
            .collect()
    }
}
