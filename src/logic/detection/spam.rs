//! Rate / Pattern Spam Checks
//!
//! Pure check logic over precomputed window counts and the effective
//! thresholds for the entity. Checks run in a fixed order and the first
//! tripped check decides.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::logic::policy::config::SpamConfig;
use crate::logic::policy::profile::SpamThresholds;
use crate::logic::types::{ModAction, ThreatType, Verdict};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Identical consecutive characters before the flood check trips
const REPEAT_RUN_LIMIT: usize = 5;

/// Uppercase ratio above which the shouting check trips
const UPPERCASE_RATIO_LIMIT: f32 = 0.5;

/// Minimum letters before the uppercase ratio is meaningful
const UPPERCASE_MIN_LETTERS: usize = 8;

/// Broadcast mention with at most this many extra mentions is benign
const BROADCAST_BENIGN_EXTRA: usize = 2;

/// Broadcast mention with more than this many extra mentions is a ban
const BROADCAST_ABUSE_EXTRA: usize = 5;

static MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@!?[0-9]+>|@[A-Za-z0-9_]{2,}").expect("mention regex"));
static BROADCAST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(everyone|here)\b").expect("broadcast regex"));
static LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("link regex"));

// ============================================================================
// EFFECTIVE THRESHOLDS
// ============================================================================

/// Combine the per-entity profile with the globally tuned config; the
/// stricter value wins per field. This is how the tuner's shrink rules take
/// effect without touching per-entity resolution.
pub fn effective_thresholds(profile: &SpamThresholds, config: &SpamConfig) -> SpamThresholds {
    SpamThresholds {
        max_msgs_per_minute: profile.max_msgs_per_minute.min(config.max_messages_per_minute),
        max_duplicates: profile.max_duplicates.min(config.max_duplicates),
        max_mentions: profile.max_mentions.min(config.max_mentions),
        max_links: profile.max_links.min(config.max_links),
        cooldown_seconds: profile.cooldown_seconds.max(config.cooldown_seconds),
    }
}

// ============================================================================
// CHECK CONTEXT
// ============================================================================

/// Window counts the pipeline computed before calling in
pub struct SpamContext {
    /// Messages in the last minute, including the current one
    pub msgs_last_minute: usize,
    /// Copies of this exact content in the duplicate window, including
    /// the current one
    pub duplicate_count: usize,
}

// ============================================================================
// CHECKS
// ============================================================================

pub fn check(content: &str, thresholds: &SpamThresholds, ctx: &SpamContext) -> Option<Verdict> {
    if let Some(verdict) = check_repeated_run(content) {
        return Some(verdict);
    }
    if let Some(verdict) = check_uppercase(content) {
        return Some(verdict);
    }
    if ctx.msgs_last_minute > thresholds.max_msgs_per_minute as usize {
        return Some(
            Verdict::new(ModAction::Mute, 0.85, "message rate over threshold", ThreatType::Spam)
                .with_evidence(json!({
                    "messages_per_minute": ctx.msgs_last_minute,
                    "threshold": thresholds.max_msgs_per_minute,
                    "cooldown_seconds": thresholds.cooldown_seconds,
                })),
        );
    }
    if let Some(verdict) = check_duplicates(ctx.duplicate_count, thresholds) {
        return Some(verdict);
    }
    if let Some(verdict) = check_mentions(content, thresholds) {
        return Some(verdict);
    }
    check_links(content, thresholds)
}

fn check_repeated_run(content: &str) -> Option<Verdict> {
    let mut run_char = '\0';
    let mut run_len = 0usize;
    for c in content.chars() {
        if c.is_whitespace() {
            run_len = 0;
            continue;
        }
        if c == run_char {
            run_len += 1;
        } else {
            run_char = c;
            run_len = 1;
        }
        if run_len >= REPEAT_RUN_LIMIT {
            return Some(
                Verdict::new(ModAction::Warn, 0.7, "repeated character flood", ThreatType::Spam)
                    .with_evidence(json!({
                        "run_char": run_char.to_string(),
                        "run_length": run_len,
                    })),
            );
        }
    }
    None
}

fn check_uppercase(content: &str) -> Option<Verdict> {
    let letters: Vec<char> = content.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < UPPERCASE_MIN_LETTERS {
        return None;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    let ratio = upper as f32 / letters.len() as f32;
    if ratio > UPPERCASE_RATIO_LIMIT {
        return Some(
            Verdict::new(ModAction::Warn, 0.6, "excessive uppercase", ThreatType::Spam)
                .with_evidence(json!({ "uppercase_ratio": ratio })),
        );
    }
    None
}

fn check_duplicates(duplicate_count: usize, thresholds: &SpamThresholds) -> Option<Verdict> {
    let limit = thresholds.max_duplicates as usize;
    if duplicate_count <= limit {
        return None;
    }
    // Escalating tiers as the flood continues past the tolerance.
    let tier = duplicate_count - limit;
    let (action, confidence) = match tier {
        1 => (ModAction::Warn, 0.75),
        2 => (ModAction::Mute, 0.85),
        _ => (ModAction::Kick, 0.9),
    };
    Some(
        Verdict::new(action, confidence, "duplicate message flood", ThreatType::Spam)
            .with_evidence(json!({
                "duplicate_count": duplicate_count,
                "threshold": limit,
            })),
    )
}

fn check_mentions(content: &str, thresholds: &SpamThresholds) -> Option<Verdict> {
    let broadcast = BROADCAST_RE.find_iter(content).count();
    let total = MENTION_RE.find_iter(content).count();
    let extra = total.saturating_sub(broadcast);

    if broadcast > 0 {
        if extra > BROADCAST_ABUSE_EXTRA {
            return Some(
                Verdict::new(
                    ModAction::Ban,
                    0.92,
                    "broadcast mention combined with mass mentions",
                    ThreatType::Spam,
                )
                .with_evidence(json!({
                    "broadcast_mentions": broadcast,
                    "extra_mentions": extra,
                })),
            );
        }
        if extra <= BROADCAST_BENIGN_EXTRA {
            // Considered and non-abusive; later stages still run.
            log::debug!(
                "broadcast mention with {} extra mentions, non-abusive",
                extra
            );
            return None;
        }
    }

    if extra > thresholds.max_mentions as usize {
        return Some(
            Verdict::new(ModAction::Delete, 0.8, "mention count over threshold", ThreatType::Spam)
                .with_evidence(json!({
                    "mention_count": extra,
                    "threshold": thresholds.max_mentions,
                })),
        );
    }
    None
}

fn check_links(content: &str, thresholds: &SpamThresholds) -> Option<Verdict> {
    let links = LINK_RE.find_iter(content).count();
    if links > thresholds.max_links as usize {
        return Some(
            Verdict::new(ModAction::Delete, 0.8, "link count over threshold", ThreatType::Spam)
                .with_evidence(json!({
                    "link_count": links,
                    "threshold": thresholds.max_links,
                })),
        );
    }
    None
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::policy::profile;

    fn thresholds() -> SpamThresholds {
        profile::resolve(5, None, None).spam
    }

    fn quiet_ctx() -> SpamContext {
        SpamContext {
            msgs_last_minute: 1,
            duplicate_count: 1,
        }
    }

    #[test]
    fn test_clean_message_passes() {
        assert!(check("hello there", &thresholds(), &quiet_ctx()).is_none());
    }

    #[test]
    fn test_repeated_run_warns() {
        let verdict = check("aaaaaaa", &thresholds(), &quiet_ctx()).unwrap();
        assert_eq!(verdict.action, ModAction::Warn);
        assert_eq!(verdict.evidence["run_char"], "a");
    }

    #[test]
    fn test_whitespace_breaks_run() {
        assert!(check("aa aa aa aa", &thresholds(), &quiet_ctx()).is_none());
    }

    #[test]
    fn test_uppercase_shouting_warns() {
        let verdict = check("STOP SHOUTING EVERYONE", &thresholds(), &quiet_ctx()).unwrap();
        assert_eq!(verdict.action, ModAction::Warn);
    }

    #[test]
    fn test_short_uppercase_ignored() {
        assert!(check("OK GO", &thresholds(), &quiet_ctx()).is_none());
    }

    #[test]
    fn test_rate_over_threshold_mutes() {
        let t = thresholds();
        let ctx = SpamContext {
            msgs_last_minute: t.max_msgs_per_minute as usize + 1,
            duplicate_count: 1,
        };
        let verdict = check("hello", &t, &ctx).unwrap();
        assert_eq!(verdict.action, ModAction::Mute);
        assert_eq!(verdict.threat_type, Some(ThreatType::Spam));
    }

    #[test]
    fn test_duplicate_tiers_escalate() {
        let t = thresholds();
        let limit = t.max_duplicates as usize;
        for (excess, expected) in [(1, ModAction::Warn), (2, ModAction::Mute), (3, ModAction::Kick)] {
            let ctx = SpamContext {
                msgs_last_minute: 1,
                duplicate_count: limit + excess,
            };
            let verdict = check("same thing", &t, &ctx).unwrap();
            assert_eq!(verdict.action, expected);
        }
    }

    #[test]
    fn test_broadcast_with_few_mentions_falls_through() {
        // Non-abusive broadcast must not terminate evaluation: the check
        // passes and later stages still see the message.
        assert!(check("@everyone meeting at 5 with @alice", &thresholds(), &quiet_ctx()).is_none());
    }

    #[test]
    fn test_broadcast_with_mass_mentions_banned() {
        let content = "@everyone @u1 @u2 @u3 @u4 @u5 @u6 go go go";
        let verdict = check(content, &thresholds(), &quiet_ctx()).unwrap();
        assert_eq!(verdict.action, ModAction::Ban);
    }

    #[test]
    fn test_mention_count_over_threshold_deletes() {
        let t = thresholds();
        let mentions: String = (0..t.max_mentions + 1)
            .map(|i| format!("<@{}> ", 1000 + i))
            .collect();
        let verdict = check(&mentions, &t, &quiet_ctx()).unwrap();
        assert_eq!(verdict.action, ModAction::Delete);
    }

    #[test]
    fn test_link_count_over_threshold_deletes() {
        let t = thresholds();
        let links: String = (0..t.max_links + 1)
            .map(|i| format!("https://ex{}.com ", i))
            .collect();
        let verdict = check(&links, &t, &quiet_ctx()).unwrap();
        assert_eq!(verdict.action, ModAction::Delete);
    }

    #[test]
    fn test_effective_thresholds_take_stricter_value() {
        let profile_side = thresholds();
        let mut config = SpamConfig::default();
        config.max_messages_per_minute = 2;
        config.cooldown_seconds = 600;

        let effective = effective_thresholds(&profile_side, &config);
        assert_eq!(effective.max_msgs_per_minute, 2);
        assert_eq!(effective.cooldown_seconds, 600);
        assert_eq!(
            effective.max_mentions,
            profile_side.max_mentions.min(config.max_mentions)
        );
    }
}
