//! Tunable Moderation Configuration
//!
//! Globally tuned thresholds, written only by the adaptive tuner and manual
//! operator overrides through the pipeline's update interface. Updates are
//! partial-field merges; invalid values are rejected per-field with the
//! prior value kept.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::ACCOUNT_AGE_CAP_DAYS;

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, Error)]
#[error("invalid value for {field}: {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// SPAM CONFIG
// ============================================================================

/// Globally tuned spam thresholds. The effective value for a check is the
/// stricter of these and the per-entity profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpamConfig {
    pub max_messages_per_minute: u32,
    pub max_duplicates: u32,
    pub max_mentions: u32,
    pub max_links: u32,
    pub cooldown_seconds: u64,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            max_messages_per_minute: 10,
            max_duplicates: 3,
            max_mentions: 8,
            max_links: 4,
            cooldown_seconds: 30,
        }
    }
}

/// Partial update for `SpamConfig`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpamConfigPatch {
    pub max_messages_per_minute: Option<u32>,
    pub max_duplicates: Option<u32>,
    pub max_mentions: Option<u32>,
    pub max_links: Option<u32>,
    pub cooldown_seconds: Option<u64>,
}

impl SpamConfig {
    /// Merge a partial update, returning the rejected fields. Valid fields
    /// in the same patch still apply.
    pub fn merge(&mut self, patch: &SpamConfigPatch) -> Vec<ConfigError> {
        let mut rejected = Vec::new();

        if let Some(v) = patch.max_messages_per_minute {
            if v >= 1 {
                self.max_messages_per_minute = v;
            } else {
                rejected.push(ConfigError::new("max_messages_per_minute", "must be >= 1"));
            }
        }
        if let Some(v) = patch.max_duplicates {
            self.max_duplicates = v;
        }
        if let Some(v) = patch.max_mentions {
            if v >= 1 {
                self.max_mentions = v;
            } else {
                rejected.push(ConfigError::new("max_mentions", "must be >= 1"));
            }
        }
        if let Some(v) = patch.max_links {
            if v >= 1 {
                self.max_links = v;
            } else {
                rejected.push(ConfigError::new("max_links", "must be >= 1"));
            }
        }
        if let Some(v) = patch.cooldown_seconds {
            if v <= 86_400 {
                self.cooldown_seconds = v;
            } else {
                rejected.push(ConfigError::new("cooldown_seconds", "must be <= 86400"));
            }
        }

        rejected
    }
}

// ============================================================================
// RAID CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaidConfig {
    pub max_joins_per_minute: u32,
    pub max_joins_per_hour: u32,
    pub min_account_age_days: u32,
}

impl Default for RaidConfig {
    fn default() -> Self {
        Self {
            max_joins_per_minute: 12,
            max_joins_per_hour: 60,
            min_account_age_days: 3,
        }
    }
}

/// Partial update for `RaidConfig`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RaidConfigPatch {
    pub max_joins_per_minute: Option<u32>,
    pub max_joins_per_hour: Option<u32>,
    pub min_account_age_days: Option<u32>,
}

impl RaidConfig {
    pub fn merge(&mut self, patch: &RaidConfigPatch) -> Vec<ConfigError> {
        let mut rejected = Vec::new();

        if let Some(v) = patch.max_joins_per_minute {
            if v >= 1 {
                self.max_joins_per_minute = v;
            } else {
                rejected.push(ConfigError::new("max_joins_per_minute", "must be >= 1"));
            }
        }
        if let Some(v) = patch.max_joins_per_hour {
            if v >= 1 {
                self.max_joins_per_hour = v;
            } else {
                rejected.push(ConfigError::new("max_joins_per_hour", "must be >= 1"));
            }
        }
        if let Some(v) = patch.min_account_age_days {
            if v <= ACCOUNT_AGE_CAP_DAYS {
                self.min_account_age_days = v;
            } else {
                rejected.push(ConfigError::new(
                    "min_account_age_days",
                    format!("must be <= {}", ACCOUNT_AGE_CAP_DAYS),
                ));
            }
        }

        rejected
    }
}

// ============================================================================
// MEDIA CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Hard cap on attachments per message
    pub max_attachments: u32,
    /// URLs longer than this are treated as hostile
    pub max_url_length: usize,
    /// Image subtypes forwarded to the NSFW classifier
    pub allowed_image_types: Vec<String>,
    /// 0.0 - 1.0; higher acts on lower NSFW confidence
    pub nsfw_sensitivity: f32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_attachments: 6,
            max_url_length: 1_024,
            allowed_image_types: vec![
                "png".to_string(),
                "jpg".to_string(),
                "jpeg".to_string(),
                "gif".to_string(),
                "webp".to_string(),
            ],
            nsfw_sensitivity: 0.5,
        }
    }
}

impl MediaConfig {
    /// Confidence floor for acting on an NSFW hit. 0.90 at the default
    /// sensitivity, 0.85 when the tuner forces sensitivity to maximum.
    pub fn nsfw_confidence_floor(&self) -> f32 {
        0.95 - 0.10 * self.nsfw_sensitivity
    }

    pub fn allows_image_type(&self, subtype: &str) -> bool {
        self.allowed_image_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(subtype))
    }
}

/// Partial update for `MediaConfig`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaConfigPatch {
    pub max_attachments: Option<u32>,
    pub max_url_length: Option<usize>,
    pub allowed_image_types: Option<Vec<String>>,
    pub nsfw_sensitivity: Option<f32>,
}

impl MediaConfig {
    pub fn merge(&mut self, patch: &MediaConfigPatch) -> Vec<ConfigError> {
        let mut rejected = Vec::new();

        if let Some(v) = patch.max_attachments {
            if v >= 1 {
                self.max_attachments = v;
            } else {
                rejected.push(ConfigError::new("max_attachments", "must be >= 1"));
            }
        }
        if let Some(v) = patch.max_url_length {
            if v >= 64 {
                self.max_url_length = v;
            } else {
                rejected.push(ConfigError::new("max_url_length", "must be >= 64"));
            }
        }
        if let Some(v) = &patch.allowed_image_types {
            if !v.is_empty() {
                self.allowed_image_types = v.clone();
            } else {
                rejected.push(ConfigError::new("allowed_image_types", "must not be empty"));
            }
        }
        if let Some(v) = patch.nsfw_sensitivity {
            if (0.0..=1.0).contains(&v) {
                self.nsfw_sensitivity = v;
            } else {
                rejected.push(ConfigError::new("nsfw_sensitivity", "must be within [0, 1]"));
            }
        }

        rejected
    }
}

// ============================================================================
// COMBINED VIEW
// ============================================================================

/// The pipeline's live configuration, held behind one lock
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModerationConfig {
    pub spam: SpamConfig,
    pub raid: RaidConfig,
    pub media: MediaConfig,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_patch_changes_nothing() {
        let mut config = SpamConfig::default();
        let before = config.clone();
        let rejected = config.merge(&SpamConfigPatch::default());
        assert!(rejected.is_empty());
        assert_eq!(config, before);
    }

    #[test]
    fn test_partial_merge_keeps_other_fields() {
        let mut config = SpamConfig::default();
        let rejected = config.merge(&SpamConfigPatch {
            max_messages_per_minute: Some(6),
            ..Default::default()
        });
        assert!(rejected.is_empty());
        assert_eq!(config.max_messages_per_minute, 6);
        assert_eq!(config.max_duplicates, SpamConfig::default().max_duplicates);
    }

    #[test]
    fn test_invalid_field_rejected_valid_applied() {
        let mut config = RaidConfig::default();
        let rejected = config.merge(&RaidConfigPatch {
            max_joins_per_minute: Some(0),
            min_account_age_days: Some(7),
            ..Default::default()
        });
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].field, "max_joins_per_minute");
        // Prior value kept for the invalid field, valid field applied.
        assert_eq!(config.max_joins_per_minute, RaidConfig::default().max_joins_per_minute);
        assert_eq!(config.min_account_age_days, 7);
    }

    #[test]
    fn test_account_age_capped() {
        let mut config = RaidConfig::default();
        let rejected = config.merge(&RaidConfigPatch {
            min_account_age_days: Some(ACCOUNT_AGE_CAP_DAYS + 1),
            ..Default::default()
        });
        assert_eq!(rejected.len(), 1);
        assert_eq!(config.min_account_age_days, RaidConfig::default().min_account_age_days);
    }

    #[test]
    fn test_nsfw_floor_tracks_sensitivity() {
        let mut media = MediaConfig::default();
        assert!((media.nsfw_confidence_floor() - 0.90).abs() < 1e-6);

        media.merge(&MediaConfigPatch {
            nsfw_sensitivity: Some(1.0),
            ..Default::default()
        });
        assert!((media.nsfw_confidence_floor() - 0.85).abs() < 1e-6);
    }
}
