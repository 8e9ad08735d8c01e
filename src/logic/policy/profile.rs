//! Aggressiveness Profile
//!
//! Converts an aggressiveness level (1 = most permissive, 10 = strictest)
//! into concrete detection thresholds. Derived fresh on every check, never
//! cached - reputation and overrides can change between calls.

use serde::{Deserialize, Serialize};

// ============================================================================
// THRESHOLD SETS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpamThresholds {
    pub max_msgs_per_minute: u32,
    pub max_duplicates: u32,
    pub max_mentions: u32,
    pub max_links: u32,
    pub cooldown_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaidThresholds {
    pub max_joins_per_window: u32,
    pub min_account_age_days: u32,
}

/// The full derived profile for one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggressivenessProfile {
    pub level: u8,
    pub ai_confidence_threshold: f32,
    pub spam: SpamThresholds,
    pub raid: RaidThresholds,
}

// ============================================================================
// PER-ENTITY OVERRIDE
// ============================================================================

/// Field-level overrides. A set field takes precedence over both the level
/// and any confidence floor for that field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverride {
    pub ai_confidence_threshold: Option<f32>,
    pub max_msgs_per_minute: Option<u32>,
    pub max_duplicates: Option<u32>,
    pub max_mentions: Option<u32>,
    pub max_links: Option<u32>,
    pub cooldown_seconds: Option<u64>,
    pub max_joins_per_window: Option<u32>,
    pub min_account_age_days: Option<u32>,
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// Linear interpolation across levels 1..=10, rounded to nearest.
fn scale(level: u8, at_level_1: f32, at_level_10: f32) -> f32 {
    let t = (level - 1) as f32 / 9.0;
    at_level_1 + (at_level_10 - at_level_1) * t
}

fn scale_u32(level: u8, at_level_1: u32, at_level_10: u32) -> u32 {
    scale(level, at_level_1 as f32, at_level_10 as f32).round() as u32
}

/// Derive the profile for a clamped level. A floor only ever raises the
/// effective AI confidence threshold; override fields win over everything.
pub fn resolve(
    level: u8,
    floor: Option<f32>,
    overrides: Option<&ProfileOverride>,
) -> AggressivenessProfile {
    let level = level.clamp(1, 10);

    let mut ai_confidence_threshold = scale(level, 0.95, 0.50);
    if let Some(floor) = floor {
        ai_confidence_threshold = ai_confidence_threshold.max(floor.clamp(0.0, 1.0));
    }

    let mut profile = AggressivenessProfile {
        level,
        ai_confidence_threshold,
        spam: SpamThresholds {
            max_msgs_per_minute: scale_u32(level, 20, 4),
            max_duplicates: scale_u32(level, 6, 1),
            max_mentions: scale_u32(level, 12, 3),
            max_links: scale_u32(level, 8, 2),
            cooldown_seconds: scale_u32(level, 5, 120) as u64,
        },
        raid: RaidThresholds {
            max_joins_per_window: scale_u32(level, 25, 5),
            min_account_age_days: scale_u32(level, 1, 14),
        },
    };

    if let Some(ov) = overrides {
        if let Some(v) = ov.ai_confidence_threshold {
            profile.ai_confidence_threshold = v.clamp(0.0, 1.0);
        }
        if let Some(v) = ov.max_msgs_per_minute {
            profile.spam.max_msgs_per_minute = v;
        }
        if let Some(v) = ov.max_duplicates {
            profile.spam.max_duplicates = v;
        }
        if let Some(v) = ov.max_mentions {
            profile.spam.max_mentions = v;
        }
        if let Some(v) = ov.max_links {
            profile.spam.max_links = v;
        }
        if let Some(v) = ov.cooldown_seconds {
            profile.spam.cooldown_seconds = v;
        }
        if let Some(v) = ov.max_joins_per_window {
            profile.raid.max_joins_per_window = v;
        }
        if let Some(v) = ov.min_account_age_days {
            profile.raid.min_account_age_days = v;
        }
    }

    profile
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_clamped() {
        assert_eq!(resolve(0, None, None).level, 1);
        assert_eq!(resolve(99, None, None).level, 10);
    }

    #[test]
    fn test_thresholds_monotonic_across_levels() {
        // Lower level => looser (or equal) thresholds, for every field.
        for level in 1..10u8 {
            let looser = resolve(level, None, None);
            let stricter = resolve(level + 1, None, None);

            assert!(looser.ai_confidence_threshold >= stricter.ai_confidence_threshold);
            assert!(looser.spam.max_msgs_per_minute >= stricter.spam.max_msgs_per_minute);
            assert!(looser.spam.max_duplicates >= stricter.spam.max_duplicates);
            assert!(looser.spam.max_mentions >= stricter.spam.max_mentions);
            assert!(looser.spam.max_links >= stricter.spam.max_links);
            assert!(looser.spam.cooldown_seconds <= stricter.spam.cooldown_seconds);
            assert!(looser.raid.max_joins_per_window >= stricter.raid.max_joins_per_window);
            assert!(looser.raid.min_account_age_days <= stricter.raid.min_account_age_days);
        }
    }

    #[test]
    fn test_floor_never_lowers_threshold() {
        for level in 1..=10u8 {
            let base = resolve(level, None, None);
            for floor in [0.0f32, 0.3, 0.6, 0.9, 1.0] {
                let floored = resolve(level, Some(floor), None);
                assert!(floored.ai_confidence_threshold >= base.ai_confidence_threshold);
                assert!(floored.ai_confidence_threshold >= floor);
            }
        }
    }

    #[test]
    fn test_override_wins_over_level_and_floor() {
        let ov = ProfileOverride {
            ai_confidence_threshold: Some(0.42),
            max_msgs_per_minute: Some(99),
            ..Default::default()
        };
        let profile = resolve(10, Some(0.9), Some(&ov));
        assert!((profile.ai_confidence_threshold - 0.42).abs() < f32::EPSILON);
        assert_eq!(profile.spam.max_msgs_per_minute, 99);
        // Untouched fields still come from the level.
        assert_eq!(profile.spam.max_links, resolve(10, None, None).spam.max_links);
    }

    #[test]
    fn test_endpoints() {
        let loosest = resolve(1, None, None);
        assert_eq!(loosest.spam.max_msgs_per_minute, 20);
        assert!((loosest.ai_confidence_threshold - 0.95).abs() < 1e-6);

        let strictest = resolve(10, None, None);
        assert_eq!(strictest.spam.max_msgs_per_minute, 4);
        assert!((strictest.ai_confidence_threshold - 0.50).abs() < 1e-6);
    }
}
