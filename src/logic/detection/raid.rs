//! Join / Raid Checks
//!
//! Sliding-window join rates, new-account heuristics and suspicious-name
//! matching. The pipeline records every join into the window before calling
//! in, so the counts always include the current join.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::constants::NEW_ACCOUNT_BAN_AGE_DAYS;
use crate::logic::policy::config::RaidConfig;
use crate::logic::policy::profile::RaidThresholds;
use crate::logic::types::{JoinEvent, ModAction, ThreatType, Verdict};

/// Name substrings that ship with the engine; the tuner merges newly
/// observed high-frequency techniques into the live list.
pub const DEFAULT_SUSPICIOUS_NAME_PATTERNS: &[&str] =
    &["raid", "nuke", "wizz", "grief", "destroy", "spambot"];

/// Distinct pattern hits in a joining name that force a ban
const NAME_PATTERN_LIMIT: usize = 2;

// ============================================================================
// CHECK CONTEXT
// ============================================================================

pub struct JoinContext {
    pub joins_last_minute: usize,
    pub joins_last_hour: usize,
}

// ============================================================================
// CHECKS
// ============================================================================

pub fn check(
    join: &JoinEvent,
    profile: &RaidThresholds,
    config: &RaidConfig,
    suspicious_names: &[String],
    ctx: &JoinContext,
    now: DateTime<Utc>,
) -> Verdict {
    let minute_cap = profile.max_joins_per_window.min(config.max_joins_per_minute) as usize;
    let hour_cap = config.max_joins_per_hour as usize;

    if ctx.joins_last_minute > minute_cap || ctx.joins_last_hour > hour_cap {
        return Verdict::new(ModAction::Ban, 0.97, "join rate over raid threshold", ThreatType::Raid)
            .with_evidence(json!({
                "joins_per_minute": ctx.joins_last_minute,
                "joins_per_hour": ctx.joins_last_hour,
                "minute_cap": minute_cap,
                "hour_cap": hour_cap,
            }));
    }

    let account_age_days = (now - join.account_created_at).num_days();
    let min_age = profile.min_account_age_days.max(config.min_account_age_days) as i64;
    let spike = ctx.joins_last_minute > (minute_cap / 2).max(2);

    if account_age_days < min_age && spike {
        let (action, confidence) = if account_age_days < NEW_ACCOUNT_BAN_AGE_DAYS {
            (ModAction::Ban, 0.9)
        } else {
            (ModAction::Kick, 0.85)
        };
        return Verdict::new(action, confidence, "new account joining during spike", ThreatType::Raid)
            .with_evidence(json!({
                "account_age_days": account_age_days,
                "min_account_age_days": min_age,
                "joins_per_minute": ctx.joins_last_minute,
            }));
    }

    let name = join.display_name.to_lowercase();
    let matched: Vec<&str> = suspicious_names
        .iter()
        .filter(|p| name.contains(p.as_str()))
        .map(|p| p.as_str())
        .collect();
    if matched.len() >= NAME_PATTERN_LIMIT {
        return Verdict::new(ModAction::Ban, 0.9, "suspicious joining name", ThreatType::Raid)
            .with_evidence(json!({
                "display_name": join.display_name,
                "matched_patterns": matched,
            }));
    }

    Verdict::allow()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::policy::profile;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn join(name: &str, age_days: i64) -> JoinEvent {
        JoinEvent {
            entity_id: "u1".to_string(),
            display_name: name.to_string(),
            community_id: "c1".to_string(),
            account_created_at: now() - Duration::days(age_days),
        }
    }

    fn defaults() -> (RaidThresholds, RaidConfig, Vec<String>) {
        (
            profile::resolve(5, None, None).raid,
            RaidConfig::default(),
            DEFAULT_SUSPICIOUS_NAME_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    #[test]
    fn test_quiet_join_allowed() {
        let (p, c, names) = defaults();
        let ctx = JoinContext { joins_last_minute: 1, joins_last_hour: 3 };
        let verdict = check(&join("alice", 365), &p, &c, &names, &ctx, now());
        assert!(verdict.is_allow());
    }

    #[test]
    fn test_minute_rate_trips_ban_with_count_evidence() {
        let (p, c, names) = defaults();
        let cap = p.max_joins_per_window.min(c.max_joins_per_minute) as usize;
        let ctx = JoinContext { joins_last_minute: cap + 4, joins_last_hour: cap + 4 };
        let verdict = check(&join("alice", 365), &p, &c, &names, &ctx, now());
        assert_eq!(verdict.action, ModAction::Ban);
        assert_eq!(verdict.threat_type, Some(ThreatType::Raid));
        assert_eq!(verdict.evidence["joins_per_minute"], cap + 4);
        assert!(verdict.confidence >= 0.95);
    }

    #[test]
    fn test_hour_rate_trips_ban() {
        let (p, c, names) = defaults();
        let ctx = JoinContext {
            joins_last_minute: 1,
            joins_last_hour: c.max_joins_per_hour as usize + 1,
        };
        let verdict = check(&join("alice", 365), &p, &c, &names, &ctx, now());
        assert_eq!(verdict.action, ModAction::Ban);
    }

    #[test]
    fn test_brand_new_account_in_spike_banned() {
        let (p, c, names) = defaults();
        let cap = p.max_joins_per_window.min(c.max_joins_per_minute) as usize;
        let ctx = JoinContext { joins_last_minute: cap / 2 + 1, joins_last_hour: cap };
        let verdict = check(&join("alice", 2), &p, &c, &names, &ctx, now());
        assert_eq!(verdict.action, ModAction::Ban);
        assert_eq!(verdict.evidence["account_age_days"], 2);
    }

    #[test]
    fn test_week_old_account_in_spike_kicked() {
        let (p, mut c, names) = defaults();
        c.min_account_age_days = 14;
        let cap = p.max_joins_per_window.min(c.max_joins_per_minute) as usize;
        let ctx = JoinContext { joins_last_minute: cap / 2 + 1, joins_last_hour: cap };
        let verdict = check(&join("alice", 10), &p, &c, &names, &ctx, now());
        assert_eq!(verdict.action, ModAction::Kick);
    }

    #[test]
    fn test_new_account_without_spike_allowed() {
        let (p, c, names) = defaults();
        let ctx = JoinContext { joins_last_minute: 1, joins_last_hour: 2 };
        let verdict = check(&join("alice", 0), &p, &c, &names, &ctx, now());
        assert!(verdict.is_allow());
    }

    #[test]
    fn test_two_name_patterns_banned_one_allowed() {
        let (p, c, names) = defaults();
        let ctx = JoinContext { joins_last_minute: 1, joins_last_hour: 1 };

        let verdict = check(&join("NukeRaid2000", 365), &p, &c, &names, &ctx, now());
        assert_eq!(verdict.action, ModAction::Ban);

        let verdict = check(&join("raidfan", 365), &p, &c, &names, &ctx, now());
        assert!(verdict.is_allow());
    }
}
