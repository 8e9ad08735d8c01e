//! External AI Classifier Contract
//!
//! The pipeline consumes the classifier as an opaque black box returning a
//! confidence and label. It must be treated as fallible and slow: any error
//! or timeout degrades to a neutral result, never a pipeline failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{Severity, ThreatType};

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
    #[error("classifier returned malformed output: {0}")]
    Malformed(String),
}

// ============================================================================
// RESULT TYPES
// ============================================================================

/// A known filter-evasion technique the classifier matches new content
/// against. New patterns are minted by the pipeline (high-confidence bypass
/// hits) and by the tuner (sustained techniques in the history).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BypassPattern {
    pub name: String,
    /// Representative content sample or template
    pub pattern: String,
    pub technique: String,
    pub countermeasure: Option<String>,
}

/// Result of `classify_bypass`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BypassAnalysis {
    pub is_bypass: bool,
    pub confidence: f32,
    pub technique: String,
    pub pattern: String,
    pub countermeasure: Option<String>,
}

/// Result of `classify_content`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub confidence: f32,
    pub threat_level: Severity,
    pub threat_type: ThreatType,
    pub reasoning: String,
}

/// Result of `classify_image`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub is_nsfw: bool,
    pub confidence: f32,
    pub categories: Vec<String>,
}

// ============================================================================
// CLASSIFIER TRAIT
// ============================================================================

/// Deep semantic judgment delegated to an external service.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Judge whether `content` evades the word filter, given the catalog of
    /// already-known bypass patterns.
    async fn classify_bypass(
        &self,
        content: &str,
        known_patterns: &[BypassPattern],
    ) -> Result<BypassAnalysis, ClassifierError>;

    /// Holistic threat read of `content` with the entity's recent messages
    /// as context.
    async fn classify_content(
        &self,
        content: &str,
        recent_history: &[String],
    ) -> Result<ContentAnalysis, ClassifierError>;

    /// NSFW judgment on a base64-encoded image payload.
    async fn classify_image(&self, base64: &str) -> Result<ImageAnalysis, ClassifierError>;
}

// ============================================================================
// NULL CLASSIFIER
// ============================================================================

/// Classifier that never flags anything. Stands in when no external
/// service is wired up, so the rule-based stages keep working on their own.
pub struct NullClassifier;

#[async_trait]
impl Classifier for NullClassifier {
    async fn classify_bypass(
        &self,
        _content: &str,
        _known_patterns: &[BypassPattern],
    ) -> Result<BypassAnalysis, ClassifierError> {
        Ok(BypassAnalysis {
            is_bypass: false,
            confidence: 0.0,
            technique: String::new(),
            pattern: String::new(),
            countermeasure: None,
        })
    }

    async fn classify_content(
        &self,
        _content: &str,
        _recent_history: &[String],
    ) -> Result<ContentAnalysis, ClassifierError> {
        Ok(ContentAnalysis {
            confidence: 0.0,
            threat_level: Severity::Low,
            threat_type: ThreatType::Toxicity,
            reasoning: "null classifier".to_string(),
        })
    }

    async fn classify_image(&self, _base64: &str) -> Result<ImageAnalysis, ClassifierError> {
        Ok(ImageAnalysis {
            is_nsfw: false,
            confidence: 0.0,
            categories: vec![],
        })
    }
}
