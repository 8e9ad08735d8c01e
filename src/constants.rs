//! Central Configuration Constants
//!
//! Single source of truth for all engine defaults.
//! To change a default threshold or cadence, only edit this file.

/// Default community aggressiveness level (1 = most permissive, 10 = strictest)
pub const DEFAULT_COMMUNITY_LEVEL: u8 = 5;

/// Aggressiveness level applied to globally protected entities
pub const PROTECTED_LEVEL: u8 = 1;

/// Reputation score at or above which the community level is relaxed by 2
pub const REPUTATION_TRUSTED_SCORE: f32 = 70.0;

/// Reputation score below which the community level is tightened by 1
pub const REPUTATION_SUSPECT_SCORE: f32 = 40.0;

/// Confidence floor for classifier-driven enforcement (bypass + NSFW).
/// The pipeline never acts on these verdicts below this confidence.
pub const AI_ACTION_FLOOR: f32 = 0.9;

/// Strikes before the warning ladder escalates to a timed mute
pub const MAX_WARNINGS: u8 = 3;

/// Inactivity window after which warning counters decay to zero (seconds)
pub const WARNING_DECAY_SECS: i64 = 86_400;

/// Duration of the mute issued on the final warning strike (seconds)
pub const WARNING_MUTE_SECS: i64 = 600;

/// Accounts younger than this are banned (not kicked) during a raid spike
pub const NEW_ACCOUNT_BAN_AGE_DAYS: i64 = 7;

/// Message-rate sliding window (seconds)
pub const MESSAGE_WINDOW_SECS: i64 = 60;

/// Duplicate-content sliding window (seconds)
pub const DUPLICATE_WINDOW_SECS: i64 = 300;

/// Join-rate sliding window horizon (seconds)
pub const JOIN_WINDOW_SECS: i64 = 3_600;

/// Maximum entities tracked per sliding-window set before oldest-inserted
/// eviction kicks in
pub const MAX_TRACKED_ENTITIES: usize = 5_000;

/// Per-entity recent-message ring passed to the content classifier
pub const CONTEXT_RING_SIZE: usize = 5;

/// Retention cap for the tuner's threshold-adjustment log
pub const ADJUSTMENT_LOG_CAP: usize = 200;

/// How many historical records one tuning pass loads
pub const TUNER_QUERY_LIMIT: usize = 1_000;

/// Tuning cadence (seconds)
pub const TUNER_INTERVAL_SECS: u64 = 3_600;

/// Window/warning sweep cadence (seconds)
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// 24h spam record count that triggers the rate-shrink rule
pub const SPAM_SURGE_24H: usize = 50;

/// 7-day raid record count that triggers the account-age rule
pub const RAID_SURGE_7D: usize = 20;

/// Hard ceiling for the tuned minimum account age (days)
pub const ACCOUNT_AGE_CAP_DAYS: u32 = 30;

/// Occurrences before a raid name technique joins the suspicious list
pub const RAID_TECHNIQUE_MIN: usize = 5;

/// Occurrences before a bypass technique is persisted as a named pattern
pub const BYPASS_TECHNIQUE_MIN: usize = 10;

/// 24h NSFW record count that forces sensitivity to maximum
pub const NSFW_SURGE_24H: usize = 20;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "ChatShield";
