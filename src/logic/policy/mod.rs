//! Aggressiveness policy: per-check profile derivation and the globally
//! tuned configuration it is combined with.

pub mod config;
pub mod profile;

pub use config::{
    ConfigError, MediaConfig, MediaConfigPatch, ModerationConfig, RaidConfig, RaidConfigPatch,
    SpamConfig, SpamConfigPatch,
};
pub use profile::{resolve, AggressivenessProfile, ProfileOverride, RaidThresholds, SpamThresholds};
