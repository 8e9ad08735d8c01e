//! Detection Pipeline
//!
//! The moderation decision engine. Two entry points - `evaluate_message`
//! and `evaluate_join` - run ordered checks against a per-call aggressiveness
//! profile and return a `Verdict`. All state lives in this explicitly
//! constructed struct; redundant instances used by the resilient wrapper are
//! independent with empty state.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::constants::{
    AI_ACTION_FLOOR, CONTEXT_RING_SIZE, DUPLICATE_WINDOW_SECS, JOIN_WINDOW_SECS,
    MAX_TRACKED_ENTITIES, MESSAGE_WINDOW_SECS, PROTECTED_LEVEL, REPUTATION_SUSPECT_SCORE,
    REPUTATION_TRUSTED_SCORE,
};
use crate::logic::classifier::{BypassAnalysis, BypassPattern, Classifier, ClassifierError};
use crate::logic::history::{CommunityConfig, HistoryError, HistoryStore};
use crate::logic::policy::config::{
    MediaConfig, MediaConfigPatch, ModerationConfig, RaidConfig, RaidConfigPatch, SpamConfig,
    SpamConfigPatch,
};
use crate::logic::policy::profile::{self, AggressivenessProfile};
use crate::logic::types::{
    JoinEvent, MessageEvent, ModAction, Severity, ThreatRecord, ThreatType, Verdict,
};

use super::attachments;
use super::raid::{self, JoinContext, DEFAULT_SUSPICIOUS_NAME_PATTERNS};
use super::spam::{self, SpamContext};
use super::warnings::{StrikeOutcome, WarningLedger, WarningStats};
use super::windows::{DuplicateTracker, RecentContext, SlidingWindows, WindowStats};
use super::word_filter::{TermCategory, WordFilter};

// ============================================================================
// ERROR HANDLING
// ============================================================================

/// Failures an evaluation can surface to the resilient wrapper. In normal
/// operation collaborator failures degrade internally and never reach here;
/// the wrapper mostly sees timeouts.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct DetectionPipeline {
    classifier: Arc<dyn Classifier>,
    history: Arc<dyn HistoryStore>,
    config: RwLock<ModerationConfig>,
    word_filter: WordFilter,
    bypass_patterns: RwLock<Vec<BypassPattern>>,
    suspicious_names: RwLock<Vec<String>>,
    warnings: Mutex<WarningLedger>,
    msg_windows: Mutex<SlidingWindows>,
    dup_tracker: Mutex<DuplicateTracker>,
    join_windows: Mutex<SlidingWindows>,
    context: Mutex<RecentContext>,
    protected: RwLock<HashSet<String>>,
}

impl DetectionPipeline {
    pub fn new(classifier: Arc<dyn Classifier>, history: Arc<dyn HistoryStore>) -> Self {
        Self::with_config(classifier, history, ModerationConfig::default())
    }

    pub fn with_config(
        classifier: Arc<dyn Classifier>,
        history: Arc<dyn HistoryStore>,
        config: ModerationConfig,
    ) -> Self {
        Self {
            classifier,
            history,
            config: RwLock::new(config),
            word_filter: WordFilter::with_defaults(),
            bypass_patterns: RwLock::new(default_bypass_patterns()),
            suspicious_names: RwLock::new(
                DEFAULT_SUSPICIOUS_NAME_PATTERNS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            warnings: Mutex::new(WarningLedger::new(MAX_TRACKED_ENTITIES)),
            msg_windows: Mutex::new(SlidingWindows::new(MESSAGE_WINDOW_SECS * 2, MAX_TRACKED_ENTITIES)),
            dup_tracker: Mutex::new(DuplicateTracker::new(DUPLICATE_WINDOW_SECS, MAX_TRACKED_ENTITIES)),
            join_windows: Mutex::new(SlidingWindows::new(JOIN_WINDOW_SECS, MAX_TRACKED_ENTITIES)),
            context: Mutex::new(RecentContext::new(CONTEXT_RING_SIZE, MAX_TRACKED_ENTITIES)),
            protected: RwLock::new(HashSet::new()),
        }
    }

    // ------------------------------------------------------------------
    // Profile resolution
    // ------------------------------------------------------------------

    /// First match wins: globally protected -> explicit override level ->
    /// community default adjusted by reputation. Derived fresh every call.
    async fn resolve_profile(&self, entity_id: &str, community_id: &str) -> AggressivenessProfile {
        let community = match self.history.community_config(community_id).await {
            Ok(cfg) => cfg.unwrap_or_default(),
            Err(e) => {
                log::warn!("community config read failed for {}: {}", community_id, e);
                CommunityConfig::default()
            }
        };
        let floor = community.confidence_floor;

        if self.protected.read().contains(entity_id) {
            return profile::resolve(PROTECTED_LEVEL, floor, None);
        }

        let entity_override = match self.history.entity_override(entity_id, community_id).await {
            Ok(ov) => ov,
            Err(e) => {
                log::warn!("entity override read failed for {}: {}", entity_id, e);
                None
            }
        };

        if let Some(ov) = &entity_override {
            if let Some(level) = ov.level {
                return profile::resolve(level, floor, Some(&ov.profile));
            }
        }

        let reputation = match self.history.reputation(entity_id, community_id).await {
            Ok(rep) => rep,
            Err(e) => {
                log::warn!("reputation read failed for {}: {}", entity_id, e);
                Default::default()
            }
        };

        let mut level = community.default_level as i16;
        if reputation.score >= REPUTATION_TRUSTED_SCORE {
            level -= 2;
        } else if reputation.score < REPUTATION_SUSPECT_SCORE {
            level += 1;
        }

        profile::resolve(
            level.clamp(1, 10) as u8,
            floor,
            entity_override.as_ref().map(|ov| &ov.profile),
        )
    }

    // ------------------------------------------------------------------
    // Message evaluation
    // ------------------------------------------------------------------

    pub async fn evaluate_message(&self, msg: &MessageEvent) -> Result<Verdict, PipelineError> {
        self.evaluate_message_at(msg, Utc::now()).await
    }

    /// Clock-injected variant backing the public entry point.
    pub async fn evaluate_message_at(
        &self,
        msg: &MessageEvent,
        now: DateTime<Utc>,
    ) -> Result<Verdict, PipelineError> {
        let profile = self.resolve_profile(&msg.entity_id, &msg.community_id).await;
        let key = entity_key(&msg.community_id, &msg.entity_id);

        // 1. Forbidden-word filter
        if let Some(hit) = self.word_filter.check(&msg.content) {
            let verdict = match hit.category {
                TermCategory::Coordination => Verdict::new(
                    ModAction::Kick,
                    0.95,
                    "attack coordination keyword",
                    ThreatType::Coordination,
                )
                .with_evidence(json!({ "term": hit.term })),
                TermCategory::Contraband => {
                    let outcome =
                        self.warnings.lock().strike(&msg.community_id, &msg.entity_id, now);
                    contraband_verdict(&hit.term, outcome)
                }
            };
            return Ok(self.finish(msg, &key, verdict).await);
        }

        // 2. Rate / pattern spam checks
        let (spam_thresholds, media_config) = {
            let config = self.config.read();
            (
                spam::effective_thresholds(&profile.spam, &config.spam),
                config.media.clone(),
            )
        };
        let spam_ctx = SpamContext {
            msgs_last_minute: self
                .msg_windows
                .lock()
                .record_and_count(&key, now, MESSAGE_WINDOW_SECS),
            duplicate_count: self.dup_tracker.lock().record_and_count(&key, &msg.content, now),
        };
        if let Some(verdict) = spam::check(&msg.content, &spam_thresholds, &spam_ctx) {
            return Ok(self.finish(msg, &key, verdict).await);
        }

        // 3. Bypass / evasion
        let known = self.bypass_patterns.read().clone();
        match self.classifier.classify_bypass(&msg.content, &known).await {
            Ok(analysis) if analysis.is_bypass && analysis.confidence >= AI_ACTION_FLOOR => {
                self.adopt_bypass_pattern(&analysis);
                let verdict = Verdict::new(
                    ModAction::Ban,
                    analysis.confidence,
                    "filter bypass attempt",
                    ThreatType::Bypass,
                )
                .with_evidence(json!({
                    "technique": analysis.technique,
                    "pattern": analysis.pattern,
                    "countermeasure": analysis.countermeasure,
                }));
                return Ok(self.finish(msg, &key, verdict).await);
            }
            Ok(_) => {}
            Err(e) => log::warn!("bypass classification failed: {}", e),
        }

        // 4. Attachments
        if let Some(verdict) =
            attachments::check(&msg.attachments, &media_config, self.classifier.as_ref()).await
        {
            return Ok(self.finish(msg, &key, verdict).await);
        }

        // 5. AI content analysis
        let recent = self.context.lock().snapshot(&key);
        match self.classifier.classify_content(&msg.content, &recent).await {
            Ok(analysis) if analysis.confidence >= profile.ai_confidence_threshold => {
                let action = match analysis.threat_level {
                    Severity::Critical => ModAction::Ban,
                    Severity::High => ModAction::Kick,
                    Severity::Medium => ModAction::Mute,
                    Severity::Low => ModAction::Warn,
                };
                let verdict =
                    Verdict::new(action, analysis.confidence, analysis.reasoning, analysis.threat_type)
                        .with_evidence(json!({
                            "threat_level": analysis.threat_level.as_str(),
                            "ai_confidence_threshold": profile.ai_confidence_threshold,
                        }));
                return Ok(self.finish(msg, &key, verdict).await);
            }
            Ok(_) => {}
            Err(e) => log::debug!("content classification failed: {}", e),
        }

        // 6. Default
        Ok(self.finish(msg, &key, Verdict::allow()).await)
    }

    /// Push context and audit non-allow verdicts. Audit write failures are
    /// logged and swallowed - the verdict still returns.
    async fn finish(&self, msg: &MessageEvent, key: &str, verdict: Verdict) -> Verdict {
        self.context.lock().push(key, &msg.content);
        if !verdict.is_allow() {
            if let Some(record) =
                ThreatRecord::from_verdict(&verdict, &msg.entity_id, &msg.community_id)
            {
                if let Err(e) = self.history.record_threat(record).await {
                    log::warn!("audit write failed: {}", e);
                }
            }
        }
        verdict
    }

    fn adopt_bypass_pattern(&self, analysis: &BypassAnalysis) {
        let mut patterns = self.bypass_patterns.write();
        if patterns.iter().any(|p| p.technique == analysis.technique) {
            return;
        }
        log::info!("new bypass pattern adopted: {}", analysis.technique);
        patterns.push(BypassPattern {
            name: analysis.technique.clone(),
            pattern: analysis.pattern.clone(),
            technique: analysis.technique.clone(),
            countermeasure: analysis.countermeasure.clone(),
        });
    }

    // ------------------------------------------------------------------
    // Join evaluation
    // ------------------------------------------------------------------

    pub async fn evaluate_join(&self, join: &JoinEvent) -> Result<Verdict, PipelineError> {
        self.evaluate_join_at(join, Utc::now()).await
    }

    pub async fn evaluate_join_at(
        &self,
        join: &JoinEvent,
        now: DateTime<Utc>,
    ) -> Result<Verdict, PipelineError> {
        let profile = self.resolve_profile(&join.entity_id, &join.community_id).await;
        let raid_config = self.config.read().raid.clone();

        // Every join is recorded, whatever the verdict.
        let ctx = {
            let mut windows = self.join_windows.lock();
            windows.record(&join.community_id, now);
            JoinContext {
                joins_last_minute: windows.count_within(&join.community_id, now, 60),
                joins_last_hour: windows.count_within(&join.community_id, now, JOIN_WINDOW_SECS),
            }
        };

        let names = self.suspicious_names.read().clone();
        let verdict = raid::check(join, &profile.raid, &raid_config, &names, &ctx, now);

        if !verdict.is_allow() {
            if let Some(record) =
                ThreatRecord::from_verdict(&verdict, &join.entity_id, &join.community_id)
            {
                if let Err(e) = self.history.record_threat(record).await {
                    log::warn!("audit write failed: {}", e);
                }
            }
        }
        Ok(verdict)
    }

    // ------------------------------------------------------------------
    // Configuration interface (tuner + operator)
    // ------------------------------------------------------------------

    pub fn spam_config(&self) -> SpamConfig {
        self.config.read().spam.clone()
    }

    pub fn update_spam_config(&self, patch: &SpamConfigPatch) -> SpamConfig {
        let mut config = self.config.write();
        for rejected in config.spam.merge(patch) {
            log::warn!("spam config update rejected: {}", rejected);
        }
        config.spam.clone()
    }

    pub fn raid_config(&self) -> RaidConfig {
        self.config.read().raid.clone()
    }

    pub fn update_raid_config(&self, patch: &RaidConfigPatch) -> RaidConfig {
        let mut config = self.config.write();
        for rejected in config.raid.merge(patch) {
            log::warn!("raid config update rejected: {}", rejected);
        }
        config.raid.clone()
    }

    pub fn media_config(&self) -> MediaConfig {
        self.config.read().media.clone()
    }

    pub fn update_media_config(&self, patch: &MediaConfigPatch) -> MediaConfig {
        let mut config = self.config.write();
        for rejected in config.media.merge(patch) {
            log::warn!("media config update rejected: {}", rejected);
        }
        config.media.clone()
    }

    /// Returns false when the technique is already known.
    pub fn add_bypass_pattern(&self, pattern: BypassPattern) -> bool {
        let mut patterns = self.bypass_patterns.write();
        if patterns.iter().any(|p| p.technique == pattern.technique) {
            return false;
        }
        log::info!("bypass pattern added: {}", pattern.technique);
        patterns.push(pattern);
        true
    }

    pub fn bypass_patterns(&self) -> Vec<BypassPattern> {
        self.bypass_patterns.read().clone()
    }

    pub fn add_suspicious_name_pattern(&self, pattern: &str) -> bool {
        let normalized = pattern.trim().to_lowercase();
        if normalized.is_empty() {
            return false;
        }
        let mut names = self.suspicious_names.write();
        if names.contains(&normalized) {
            return false;
        }
        log::info!("suspicious name pattern added: {}", normalized);
        names.push(normalized);
        true
    }

    pub fn suspicious_name_patterns(&self) -> Vec<String> {
        self.suspicious_names.read().clone()
    }

    // ------------------------------------------------------------------
    // Operator surface
    // ------------------------------------------------------------------

    pub fn protect_entity(&self, entity_id: &str) {
        self.protected.write().insert(entity_id.to_string());
    }

    pub fn unprotect_entity(&self, entity_id: &str) {
        self.protected.write().remove(entity_id);
    }

    pub fn is_protected(&self, entity_id: &str) -> bool {
        self.protected.read().contains(entity_id)
    }

    /// Periodic prune/evict pass over windows and warning state.
    pub fn sweep(&self, now: DateTime<Utc>) {
        self.msg_windows.lock().prune(now);
        self.dup_tracker.lock().prune(now);
        self.join_windows.lock().prune(now);
        self.warnings.lock().sweep(now);
    }

    pub fn stats(&self, now: DateTime<Utc>) -> PipelineStats {
        PipelineStats {
            windows: WindowStats {
                message_entities: self.msg_windows.lock().tracked_entities(),
                join_entities: self.join_windows.lock().tracked_entities(),
                duplicate_entities: self.dup_tracker.lock().tracked_entities(),
            },
            warnings: self.warnings.lock().stats(now),
            bypass_patterns: self.bypass_patterns.read().len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub windows: WindowStats,
    pub warnings: WarningStats,
    pub bypass_patterns: usize,
}

// ============================================================================
// HELPERS
// ============================================================================

fn entity_key(community_id: &str, entity_id: &str) -> String {
    format!("{}:{}", community_id, entity_id)
}

fn contraband_verdict(term: &str, outcome: StrikeOutcome) -> Verdict {
    match outcome {
        StrikeOutcome::StillMuted { remaining_secs } => Verdict::new(
            ModAction::Mute,
            0.9,
            "entity is still muted",
            ThreatType::Profanity,
        )
        .with_evidence(json!({ "term": term, "remaining_secs": remaining_secs })),
        StrikeOutcome::Strike { count, remaining } => Verdict::new(
            ModAction::Delete,
            0.85,
            "forbidden term",
            ThreatType::Profanity,
        )
        .with_evidence(json!({ "term": term, "strike": count, "remaining_warnings": remaining })),
        StrikeOutcome::MuteTriggered { duration_secs } => Verdict::new(
            ModAction::Mute,
            0.9,
            "third strike, timed mute",
            ThreatType::Profanity,
        )
        .with_evidence(json!({ "term": term, "mute_secs": duration_secs })),
    }
}

fn default_bypass_patterns() -> Vec<BypassPattern> {
    vec![
        BypassPattern {
            name: "zero_width_spacing".to_string(),
            pattern: "letters separated by zero-width characters".to_string(),
            technique: "zero_width_spacing".to_string(),
            countermeasure: Some("strip zero-width codepoints before matching".to_string()),
        },
        BypassPattern {
            name: "homoglyph_swap".to_string(),
            pattern: "cyrillic/greek lookalike substitution".to_string(),
            technique: "homoglyph_swap".to_string(),
            countermeasure: Some("fold confusable codepoints to ascii".to_string()),
        },
    ]
}

// ============================================================================
// TESTS
// ============================================================================
