//! Warning Ladder
//!
//! Per (community, entity) three-strike state for contraband hits. Strikes
//! 1-2 delete the content, the third strike issues a timed mute and resets
//! the counter. Untouched entries decay to zero after the inactivity
//! window.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::constants::{MAX_WARNINGS, WARNING_DECAY_SECS, WARNING_MUTE_SECS};

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone)]
pub struct WarningState {
    pub count: u8,
    pub last_warning_at: DateTime<Utc>,
    pub muted_until: Option<DateTime<Utc>>,
}

/// Outcome of one strike against the ladder
#[derive(Debug, Clone, PartialEq)]
pub enum StrikeOutcome {
    /// Entity is already muted; remaining mute time in seconds
    StillMuted { remaining_secs: i64 },
    /// Content deleted; warnings left before the mute
    Strike { count: u8, remaining: u8 },
    /// Third strike - timed mute issued, counter reset
    MuteTriggered { duration_secs: i64 },
}

// ============================================================================
// LEDGER
// ============================================================================

pub struct WarningLedger {
    decay: Duration,
    mute_duration: Duration,
    max_entries: usize,
    entries: HashMap<(String, String), WarningState>,
    insertion_order: VecDeque<(String, String)>,
}

impl WarningLedger {
    pub fn new(max_entries: usize) -> Self {
        Self {
            decay: Duration::seconds(WARNING_DECAY_SECS),
            mute_duration: Duration::seconds(WARNING_MUTE_SECS),
            max_entries,
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    /// Apply one contraband strike for (community, entity) at `now`.
    pub fn strike(&mut self, community_id: &str, entity_id: &str, now: DateTime<Utc>) -> StrikeOutcome {
        let key = (community_id.to_string(), entity_id.to_string());

        if !self.entries.contains_key(&key) {
            self.insertion_order.push_back(key.clone());
            while self.insertion_order.len() > self.max_entries {
                if let Some(oldest) = self.insertion_order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }

        let state = self.entries.entry(key).or_insert(WarningState {
            count: 0,
            last_warning_at: now,
            muted_until: None,
        });

        // A live mute short-circuits; no extra strike accumulates.
        if let Some(muted_until) = state.muted_until {
            if muted_until > now {
                return StrikeOutcome::StillMuted {
                    remaining_secs: (muted_until - now).num_seconds(),
                };
            }
            state.muted_until = None;
        }

        // Inactivity decay resets the counter before the new strike lands.
        if now - state.last_warning_at > self.decay {
            state.count = 0;
        }

        state.count += 1;
        state.last_warning_at = now;

        if state.count >= MAX_WARNINGS {
            state.count = 0;
            state.muted_until = Some(now + self.mute_duration);
            StrikeOutcome::MuteTriggered {
                duration_secs: self.mute_duration.num_seconds(),
            }
        } else {
            StrikeOutcome::Strike {
                count: state.count,
                remaining: MAX_WARNINGS - state.count,
            }
        }
    }

    /// Drop decayed, unmuted entries.
    pub fn sweep(&mut self, now: DateTime<Utc>) {
        let decay = self.decay;
        self.entries.retain(|_, state| {
            let muted = state.muted_until.map(|m| m > now).unwrap_or(false);
            muted || now - state.last_warning_at <= decay
        });
        self.insertion_order.retain(|k| self.entries.contains_key(k));
    }

    pub fn stats(&self, now: DateTime<Utc>) -> WarningStats {
        let muted = self
            .entries
            .values()
            .filter(|s| s.muted_until.map(|m| m > now).unwrap_or(false))
            .count();
        WarningStats {
            tracked_pairs: self.entries.len(),
            currently_muted: muted,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WarningStats {
    pub tracked_pairs: usize,
    pub currently_muted: usize,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_ladder_delete_delete_mute() {
        let mut ledger = WarningLedger::new(100);

        assert_eq!(
            ledger.strike("c1", "u1", ts(0)),
            StrikeOutcome::Strike { count: 1, remaining: 2 }
        );
        assert_eq!(
            ledger.strike("c1", "u1", ts(10)),
            StrikeOutcome::Strike { count: 2, remaining: 1 }
        );
        assert_eq!(
            ledger.strike("c1", "u1", ts(20)),
            StrikeOutcome::MuteTriggered { duration_secs: WARNING_MUTE_SECS }
        );
    }

    #[test]
    fn test_fourth_hit_reports_still_muted() {
        let mut ledger = WarningLedger::new(100);
        for i in 0..3 {
            ledger.strike("c1", "u1", ts(i));
        }
        match ledger.strike("c1", "u1", ts(10)) {
            StrikeOutcome::StillMuted { remaining_secs } => {
                assert!(remaining_secs > 0 && remaining_secs <= WARNING_MUTE_SECS);
            }
            other => panic!("expected StillMuted, got {:?}", other),
        }
    }

    #[test]
    fn test_decay_resets_counter() {
        let mut ledger = WarningLedger::new(100);
        ledger.strike("c1", "u1", ts(0));
        ledger.strike("c1", "u1", ts(10));

        // Past the decay window the next hit is strike 1 again.
        let outcome = ledger.strike("c1", "u1", ts(WARNING_DECAY_SECS + 11));
        assert_eq!(outcome, StrikeOutcome::Strike { count: 1, remaining: 2 });
    }

    #[test]
    fn test_strikes_after_mute_expiry_start_fresh() {
        let mut ledger = WarningLedger::new(100);
        for i in 0..3 {
            ledger.strike("c1", "u1", ts(i));
        }
        let outcome = ledger.strike("c1", "u1", ts(WARNING_MUTE_SECS + 5));
        assert_eq!(outcome, StrikeOutcome::Strike { count: 1, remaining: 2 });
    }

    #[test]
    fn test_communities_do_not_share_state() {
        let mut ledger = WarningLedger::new(100);
        ledger.strike("c1", "u1", ts(0));
        let outcome = ledger.strike("c2", "u1", ts(1));
        assert_eq!(outcome, StrikeOutcome::Strike { count: 1, remaining: 2 });
    }

    #[test]
    fn test_sweep_drops_decayed_entries() {
        let mut ledger = WarningLedger::new(100);
        ledger.strike("c1", "u1", ts(0));
        ledger.strike("c1", "u2", ts(WARNING_DECAY_SECS + 100));
        ledger.sweep(ts(WARNING_DECAY_SECS + 101));
        assert_eq!(ledger.stats(ts(WARNING_DECAY_SECS + 101)).tracked_pairs, 1);
    }
}
