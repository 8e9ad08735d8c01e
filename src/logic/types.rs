//! Core Verdict Types
//!
//! Data structures shared across the detection pipeline, the resilient
//! wrapper and the adaptive tuner. No logic here - only types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// MODERATION ACTIONS
// ============================================================================

/// Action the platform connector should execute for a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModAction {
    /// Let the event through untouched
    Allow,
    /// DM / notify the entity
    Warn,
    /// Timed timeout
    Mute,
    /// Remove from the community, can rejoin
    Kick,
    /// Remove permanently
    Ban,
    /// Remove the offending content
    Delete,
    /// Edit/repost the content with mentions stripped
    SanitizeMentions,
}

impl ModAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModAction::Allow => "allow",
            ModAction::Warn => "warn",
            ModAction::Mute => "mute",
            ModAction::Kick => "kick",
            ModAction::Ban => "ban",
            ModAction::Delete => "delete",
            ModAction::SanitizeMentions => "sanitize_mentions",
        }
    }

    pub fn severity_level(&self) -> u8 {
        match self {
            ModAction::Allow => 0,
            ModAction::Warn | ModAction::SanitizeMentions => 1,
            ModAction::Delete => 2,
            ModAction::Mute => 3,
            ModAction::Kick => 4,
            ModAction::Ban => 5,
        }
    }

    /// Reputation penalty magnitude keyed to action severity.
    /// Applied by the caller, never by the pipeline itself.
    pub fn reputation_penalty(&self) -> i32 {
        match self {
            ModAction::Allow => 0,
            ModAction::Warn | ModAction::SanitizeMentions => -1,
            ModAction::Delete => -2,
            ModAction::Mute => -5,
            ModAction::Kick => -10,
            ModAction::Ban => -20,
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, ModAction::Kick | ModAction::Ban)
    }
}

impl std::fmt::Display for ModAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// THREAT TYPES
// ============================================================================

/// Category of abuse a verdict or historical record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    Spam,
    Raid,
    Bypass,
    Nsfw,
    Toxicity,
    Profanity,
    Coordination,
}

impl ThreatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::Spam => "spam",
            ThreatType::Raid => "raid",
            ThreatType::Bypass => "bypass",
            ThreatType::Nsfw => "nsfw",
            ThreatType::Toxicity => "toxicity",
            ThreatType::Profanity => "profanity",
            ThreatType::Coordination => "coordination",
        }
    }
}

impl std::fmt::Display for ThreatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SEVERITY LEVELS
// ============================================================================

/// Severity of a threat (separate from the chosen action)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.9 {
            Severity::Critical
        } else if score >= 0.7 {
            Severity::High
        } else if score >= 0.4 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn is_high(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

// ============================================================================
// VERDICT
// ============================================================================

/// Per-event decision produced by the pipeline. Never mutated after return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub action: ModAction,
    /// Confidence in the decision (0.0 - 1.0)
    pub confidence: f32,
    pub reason: String,
    pub threat_type: Option<ThreatType>,
    /// Free-form supporting evidence for the connector / audit trail
    pub evidence: serde_json::Value,
    /// Penalty the caller applies to the entity's reputation
    pub reputation_penalty: i32,
}

impl Verdict {
    pub fn allow() -> Self {
        Self {
            action: ModAction::Allow,
            confidence: 1.0,
            reason: "no threat detected".to_string(),
            threat_type: None,
            evidence: serde_json::Value::Null,
            reputation_penalty: 0,
        }
    }

    pub fn new(
        action: ModAction,
        confidence: f32,
        reason: impl Into<String>,
        threat_type: ThreatType,
    ) -> Self {
        Self {
            action,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
            threat_type: Some(threat_type),
            evidence: serde_json::Value::Null,
            reputation_penalty: action.reputation_penalty(),
        }
    }

    pub fn with_evidence(mut self, evidence: serde_json::Value) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn is_allow(&self) -> bool {
        self.action == ModAction::Allow
    }
}

// ============================================================================
// INBOUND EVENTS
// ============================================================================

/// Attachment metadata delivered with a message event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    /// MIME type as reported by the platform
    pub content_type: String,
    pub size_bytes: u64,
    pub url: String,
    /// Base64 payload when the connector prefetched the content
    pub data: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    pub fn image_subtype(&self) -> Option<&str> {
        self.content_type.strip_prefix("image/")
    }
}

/// A message posted in a community
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub entity_id: String,
    pub community_id: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A member joining a community
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinEvent {
    pub entity_id: String,
    pub display_name: String,
    pub community_id: String,
    pub account_created_at: DateTime<Utc>,
}

// ============================================================================
// HISTORICAL RECORD
// ============================================================================

/// Audit record of a non-allow verdict, persisted through the history store
/// and mined by the adaptive tuner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub entity_id: String,
    pub community_id: String,
    pub threat_type: ThreatType,
    pub severity: Severity,
    pub action: ModAction,
    /// Technique label when the classifier supplied one
    pub technique: Option<String>,
    pub confidence: f32,
}

impl ThreatRecord {
    pub fn from_verdict(verdict: &Verdict, entity_id: &str, community_id: &str) -> Option<Self> {
        let threat_type = verdict.threat_type?;
        Some(Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            entity_id: entity_id.to_string(),
            community_id: community_id.to_string(),
            threat_type,
            severity: Severity::from_score(verdict.confidence),
            action: verdict.action,
            technique: verdict
                .evidence
                .get("technique")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            confidence: verdict.confidence,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
