//! Tuner Types
//!
//! Aggregated pattern summaries, the append-only adjustment log entry and
//! attack predictions. No logic here - only types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::types::{Severity, ThreatType};

// ============================================================================
// THREAT PATTERN
// ============================================================================

/// Per-threat-type summary, recomputed wholesale on each tuning pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatPattern {
    pub threat_type: ThreatType,
    pub frequency: usize,
    pub dominant_severity: Severity,
    /// Most frequent technique labels, highest first
    pub top_techniques: Vec<String>,
    /// Hours of day (UTC) where activity concentrates
    pub peak_hours: Vec<u32>,
    pub affected_communities: Vec<String>,
    /// Entities with three or more records of this type
    pub repeat_offenders: Vec<String>,
}

// ============================================================================
// THRESHOLD ADJUSTMENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentSeverity {
    Minor,
    Major,
    Critical,
}

/// Append-only log entry for one applied configuration change.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdAdjustment {
    pub id: Uuid,
    /// Which config the change landed in ("spam", "raid", "media", "bypass")
    pub config: &'static str,
    pub parameter: &'static str,
    pub old_value: f64,
    pub new_value: f64,
    pub reason: String,
    pub severity: AdjustmentSeverity,
    pub timestamp: DateTime<Utc>,
}

impl ThresholdAdjustment {
    pub fn new(
        config: &'static str,
        parameter: &'static str,
        old_value: f64,
        new_value: f64,
        reason: impl Into<String>,
        severity: AdjustmentSeverity,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            parameter,
            old_value,
            new_value,
            reason: reason.into(),
            severity,
            timestamp,
        }
    }
}

// ============================================================================
// ATTACK PREDICTION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackPrediction {
    pub threat_type: ThreatType,
    /// 0.0 - 0.99
    pub probability: f32,
    /// "now", "in Nh" or "within 24h"
    pub expected_timeframe: String,
    pub basis: String,
}

// ============================================================================
// REPORT
// ============================================================================

/// Outcome of one tuning pass.
#[derive(Debug, Clone, Serialize)]
pub struct TunerReport {
    pub records_examined: usize,
    pub patterns: Vec<ThreatPattern>,
    pub adjustments: Vec<ThresholdAdjustment>,
    pub predictions: Vec<AttackPrediction>,
}

impl TunerReport {
    pub fn empty() -> Self {
        Self {
            records_examined: 0,
            patterns: vec![],
            adjustments: vec![],
            predictions: vec![],
        }
    }
}
