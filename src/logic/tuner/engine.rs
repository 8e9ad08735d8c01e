//! Adaptive Tuner
//!
//! Hourly controller that mines recent history into threat patterns,
//! re-tunes the pipeline through its configuration-update interface (the
//! single writer path besides manual operator overrides) and produces
//! attack predictions. Every applied change lands in the capped adjustment
//! log.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::constants::{
    ACCOUNT_AGE_CAP_DAYS, ADJUSTMENT_LOG_CAP, BYPASS_TECHNIQUE_MIN, NSFW_SURGE_24H,
    RAID_SURGE_7D, RAID_TECHNIQUE_MIN, SPAM_SURGE_24H, TUNER_INTERVAL_SECS, TUNER_QUERY_LIMIT,
};
use crate::logic::classifier::BypassPattern;
use crate::logic::detection::DetectionPipeline;
use crate::logic::history::HistoryStore;
use crate::logic::policy::config::{MediaConfigPatch, RaidConfigPatch, SpamConfigPatch};
use crate::logic::resilience::CircuitGuard;
use crate::logic::types::{ThreatRecord, ThreatType};

use super::patterns::{mine_patterns, predict_attacks};
use super::types::{AdjustmentSeverity, ThresholdAdjustment, TunerReport};

// ============================================================================
// TUNER
// ============================================================================

pub struct AdaptiveTuner {
    guard: Arc<CircuitGuard<DetectionPipeline>>,
    history: Arc<dyn HistoryStore>,
    adjustments: Mutex<VecDeque<ThresholdAdjustment>>,
}

impl AdaptiveTuner {
    pub fn new(guard: Arc<CircuitGuard<DetectionPipeline>>, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            guard,
            history,
            adjustments: Mutex::new(VecDeque::new()),
        }
    }

    /// One full tuning pass. Also the on-demand entry point.
    pub async fn run_once(&self, now: DateTime<Utc>) -> TunerReport {
        let records = match self.history.query_recent(TUNER_QUERY_LIMIT).await {
            Ok(records) => records,
            Err(e) => {
                log::warn!("tuning pass skipped, history unavailable: {}", e);
                return TunerReport::empty();
            }
        };

        let patterns = mine_patterns(&records);
        let mut adjustments = Vec::new();

        self.apply_spam_rule(&records, now, &mut adjustments);
        self.apply_raid_rules(&records, now, &mut adjustments);
        self.apply_bypass_rule(&records, now, &mut adjustments);
        self.apply_nsfw_rule(&records, now, &mut adjustments);

        let predictions = predict_attacks(&patterns, now);
        self.append_adjustments(&adjustments);

        log::info!(
            "tuning pass: {} records, {} patterns, {} adjustments, {} predictions",
            records.len(),
            patterns.len(),
            adjustments.len(),
            predictions.len()
        );

        TunerReport {
            records_examined: records.len(),
            patterns,
            adjustments,
            predictions,
        }
    }

    // ------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------

    /// Heavy 24h spam volume: shrink the message rate by 20% (rounded down,
    /// floored at 1) and zero the duplicate tolerance.
    fn apply_spam_rule(
        &self,
        records: &[ThreatRecord],
        now: DateTime<Utc>,
        adjustments: &mut Vec<ThresholdAdjustment>,
    ) {
        let spam_24h = count_recent(records, ThreatType::Spam, now, 24);
        if spam_24h <= SPAM_SURGE_24H {
            return;
        }

        let pipeline = self.guard.active();
        let current = pipeline.spam_config();
        let target = (current.max_messages_per_minute * 4 / 5).max(1);
        if target >= current.max_messages_per_minute {
            return;
        }

        let applied = pipeline.update_spam_config(&SpamConfigPatch {
            max_messages_per_minute: Some(target),
            max_duplicates: Some(0),
            ..Default::default()
        });
        adjustments.push(ThresholdAdjustment::new(
            "spam",
            "max_messages_per_minute",
            current.max_messages_per_minute as f64,
            applied.max_messages_per_minute as f64,
            format!("{} spam records in 24h", spam_24h),
            AdjustmentSeverity::Major,
            now,
        ));
        if current.max_duplicates != 0 {
            adjustments.push(ThresholdAdjustment::new(
                "spam",
                "max_duplicates",
                current.max_duplicates as f64,
                0.0,
                "duplicate tolerance zeroed during spam surge",
                AdjustmentSeverity::Minor,
                now,
            ));
        }
    }

    /// 7-day raid volume raises the minimum account age (capped); newly
    /// observed high-frequency raid techniques join the suspicious-name
    /// list regardless of volume.
    fn apply_raid_rules(
        &self,
        records: &[ThreatRecord],
        now: DateTime<Utc>,
        adjustments: &mut Vec<ThresholdAdjustment>,
    ) {
        let pipeline = self.guard.active();

        let raid_7d = count_recent(records, ThreatType::Raid, now, 24 * 7);
        if raid_7d > RAID_SURGE_7D {
            let current = pipeline.raid_config();
            let target = (current.min_account_age_days + 2).min(ACCOUNT_AGE_CAP_DAYS);
            if target > current.min_account_age_days {
                let applied = pipeline.update_raid_config(&RaidConfigPatch {
                    min_account_age_days: Some(target),
                    ..Default::default()
                });
                adjustments.push(ThresholdAdjustment::new(
                    "raid",
                    "min_account_age_days",
                    current.min_account_age_days as f64,
                    applied.min_account_age_days as f64,
                    format!("{} raid records in 7d", raid_7d),
                    AdjustmentSeverity::Major,
                    now,
                ));
            }
        }

        for (technique, count) in technique_counts(records, ThreatType::Raid) {
            if count < RAID_TECHNIQUE_MIN {
                continue;
            }
            let before = pipeline.suspicious_name_patterns().len();
            if pipeline.add_suspicious_name_pattern(&technique) {
                adjustments.push(ThresholdAdjustment::new(
                    "raid",
                    "suspicious_name_patterns",
                    before as f64,
                    (before + 1) as f64,
                    format!("raid technique '{}' seen {} times", technique, count),
                    AdjustmentSeverity::Minor,
                    now,
                ));
            }
        }
    }

    /// Sustained bypass techniques become named patterns in the catalog.
    fn apply_bypass_rule(
        &self,
        records: &[ThreatRecord],
        now: DateTime<Utc>,
        adjustments: &mut Vec<ThresholdAdjustment>,
    ) {
        let pipeline = self.guard.active();
        for (technique, count) in technique_counts(records, ThreatType::Bypass) {
            if count < BYPASS_TECHNIQUE_MIN {
                continue;
            }
            let before = pipeline.bypass_patterns().len();
            let added = pipeline.add_bypass_pattern(BypassPattern {
                name: technique.clone(),
                pattern: format!("recurring technique: {}", technique),
                technique: technique.clone(),
                countermeasure: None,
            });
            if added {
                adjustments.push(ThresholdAdjustment::new(
                    "bypass",
                    "patterns",
                    before as f64,
                    (before + 1) as f64,
                    format!("bypass technique '{}' seen {} times", technique, count),
                    AdjustmentSeverity::Minor,
                    now,
                ));
            }
        }
    }

    /// Sustained NSFW volume forces the sensitivity to maximum.
    fn apply_nsfw_rule(
        &self,
        records: &[ThreatRecord],
        now: DateTime<Utc>,
        adjustments: &mut Vec<ThresholdAdjustment>,
    ) {
        let nsfw_24h = count_recent(records, ThreatType::Nsfw, now, 24);
        if nsfw_24h <= NSFW_SURGE_24H {
            return;
        }

        let pipeline = self.guard.active();
        let current = pipeline.media_config();
        if current.nsfw_sensitivity >= 1.0 {
            return;
        }

        pipeline.update_media_config(&MediaConfigPatch {
            nsfw_sensitivity: Some(1.0),
            ..Default::default()
        });
        adjustments.push(ThresholdAdjustment::new(
            "media",
            "nsfw_sensitivity",
            current.nsfw_sensitivity as f64,
            1.0,
            format!("{} nsfw records in 24h", nsfw_24h),
            AdjustmentSeverity::Major,
            now,
        ));
    }

    // ------------------------------------------------------------------
    // Adjustment log
    // ------------------------------------------------------------------

    fn append_adjustments(&self, adjustments: &[ThresholdAdjustment]) {
        let mut log = self.adjustments.lock();
        for adjustment in adjustments {
            log.push_back(adjustment.clone());
        }
        while log.len() > ADJUSTMENT_LOG_CAP {
            log.pop_front();
        }
    }

    pub fn adjustment_log(&self) -> Vec<ThresholdAdjustment> {
        self.adjustments.lock().iter().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Background cadence
    // ------------------------------------------------------------------

    /// Fixed-interval background task. The handle must be aborted on
    /// shutdown - the engine facade owns that.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let tuner = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(TUNER_INTERVAL_SECS));
            // The first tick fires immediately; the first real pass waits
            // one full period.
            interval.tick().await;
            loop {
                interval.tick().await;
                tuner.run_once(Utc::now()).await;
            }
        })
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn count_recent(
    records: &[ThreatRecord],
    threat_type: ThreatType,
    now: DateTime<Utc>,
    hours: i64,
) -> usize {
    let cutoff = now - chrono::Duration::hours(hours);
    records
        .iter()
        .filter(|r| r.threat_type == threat_type && r.timestamp > cutoff && r.timestamp <= now)
        .count()
}

fn technique_counts(records: &[ThreatRecord], threat_type: ThreatType) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records.iter().filter(|r| r.threat_type == threat_type) {
        if let Some(technique) = &record.technique {
            *counts.entry(technique.as_str()).or_default() += 1;
        }
    }
    let mut sorted: Vec<(String, usize)> =
        counts.into_iter().map(|(t, c)| (t.to_string(), c)).collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    sorted
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::classifier::NullClassifier;
    use crate::logic::history::MemoryHistoryStore;
    use crate::logic::resilience::CircuitConfig;
    use crate::logic::types::{ModAction, Severity};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn record(
        threat_type: ThreatType,
        hours_ago: i64,
        entity: &str,
        technique: Option<&str>,
    ) -> ThreatRecord {
        ThreatRecord {
            id: Uuid::new_v4(),
            timestamp: now() - chrono::Duration::hours(hours_ago),
            entity_id: entity.to_string(),
            community_id: "c1".to_string(),
            threat_type,
            severity: Severity::Medium,
            action: ModAction::Mute,
            technique: technique.map(|t| t.to_string()),
            confidence: 0.9,
        }
    }

    async fn tuner_with_records(records: Vec<ThreatRecord>) -> (AdaptiveTuner, Arc<CircuitGuard<DetectionPipeline>>) {
        let store = Arc::new(MemoryHistoryStore::new());
        for r in records {
            store.record_threat(r).await.unwrap();
        }
        let classifier = Arc::new(NullClassifier);
        let guard = Arc::new(CircuitGuard::new(
            DetectionPipeline::new(classifier.clone(), store.clone()),
            vec![DetectionPipeline::new(classifier, store.clone())],
            CircuitConfig::default(),
        ));
        (AdaptiveTuner::new(guard.clone(), store), guard)
    }

    #[tokio::test]
    async fn test_spam_surge_shrinks_rate_by_twenty_percent() {
        let records: Vec<_> = (0..60)
            .map(|i| record(ThreatType::Spam, 1, &format!("u{}", i), None))
            .collect();
        let (tuner, guard) = tuner_with_records(records).await;

        let before = guard.active().spam_config();
        assert_eq!(before.max_messages_per_minute, 10);

        let report = tuner.run_once(now()).await;

        let after = guard.active().spam_config();
        assert_eq!(after.max_messages_per_minute, 8); // floor(10 * 0.8)
        assert_eq!(after.max_duplicates, 0);

        let major: Vec<_> = report
            .adjustments
            .iter()
            .filter(|a| a.parameter == "max_messages_per_minute")
            .collect();
        assert_eq!(major.len(), 1);
        assert_eq!(major[0].severity, AdjustmentSeverity::Major);
        assert_eq!(major[0].old_value, 10.0);
        assert_eq!(major[0].new_value, 8.0);
    }

    #[tokio::test]
    async fn test_rate_floor_is_one() {
        let records: Vec<_> = (0..60)
            .map(|i| record(ThreatType::Spam, 1, &format!("u{}", i), None))
            .collect();
        let (tuner, guard) = tuner_with_records(records).await;
        guard.active().update_spam_config(&SpamConfigPatch {
            max_messages_per_minute: Some(1),
            ..Default::default()
        });

        let report = tuner.run_once(now()).await;
        assert_eq!(guard.active().spam_config().max_messages_per_minute, 1);
        // 1 cannot shrink further: no adjustment recorded.
        assert!(report.adjustments.iter().all(|a| a.parameter != "max_messages_per_minute"));
    }

    #[tokio::test]
    async fn test_quiet_history_changes_nothing() {
        let (tuner, guard) = tuner_with_records(vec![record(ThreatType::Spam, 1, "u1", None)]).await;
        let before = guard.active().spam_config();
        let report = tuner.run_once(now()).await;
        assert!(report.adjustments.is_empty());
        assert_eq!(guard.active().spam_config(), before);
    }

    #[tokio::test]
    async fn test_old_spam_records_do_not_count() {
        // 60 spam records, all older than 24h.
        let records: Vec<_> = (0..60)
            .map(|i| record(ThreatType::Spam, 30, &format!("u{}", i), None))
            .collect();
        let (tuner, guard) = tuner_with_records(records).await;
        tuner.run_once(now()).await;
        assert_eq!(guard.active().spam_config().max_messages_per_minute, 10);
    }

    #[tokio::test]
    async fn test_raid_surge_raises_account_age_capped() {
        let records: Vec<_> = (0..25)
            .map(|i| record(ThreatType::Raid, 24, &format!("u{}", i), None))
            .collect();
        let (tuner, guard) = tuner_with_records(records).await;

        let report = tuner.run_once(now()).await;
        assert_eq!(guard.active().raid_config().min_account_age_days, 5);
        assert!(report
            .adjustments
            .iter()
            .any(|a| a.parameter == "min_account_age_days" && a.severity == AdjustmentSeverity::Major));

        // Repeated passes converge on the cap instead of growing forever.
        for _ in 0..20 {
            tuner.run_once(now()).await;
        }
        assert_eq!(guard.active().raid_config().min_account_age_days, ACCOUNT_AGE_CAP_DAYS);
    }

    #[tokio::test]
    async fn test_raid_technique_merged_into_name_patterns() {
        let records: Vec<_> = (0..6)
            .map(|i| record(ThreatType::Raid, 2, &format!("u{}", i), Some("hydra")))
            .collect();
        let (tuner, guard) = tuner_with_records(records).await;

        tuner.run_once(now()).await;
        assert!(guard
            .active()
            .suspicious_name_patterns()
            .contains(&"hydra".to_string()));

        // Second pass: already known, no duplicate adjustment.
        let report = tuner.run_once(now()).await;
        assert!(report.adjustments.iter().all(|a| a.parameter != "suspicious_name_patterns"));
    }

    #[tokio::test]
    async fn test_sustained_bypass_technique_persisted_once() {
        let records: Vec<_> = (0..12)
            .map(|i| record(ThreatType::Bypass, 2, &format!("u{}", i), Some("reversed_text")))
            .collect();
        let (tuner, guard) = tuner_with_records(records).await;

        let before = guard.active().bypass_patterns().len();
        let report = tuner.run_once(now()).await;
        assert_eq!(guard.active().bypass_patterns().len(), before + 1);
        assert_eq!(
            report.adjustments.iter().filter(|a| a.config == "bypass").count(),
            1
        );

        let report = tuner.run_once(now()).await;
        assert_eq!(guard.active().bypass_patterns().len(), before + 1);
        assert!(report.adjustments.iter().all(|a| a.config != "bypass"));
    }

    #[tokio::test]
    async fn test_nsfw_surge_forces_max_sensitivity() {
        let records: Vec<_> = (0..25)
            .map(|i| record(ThreatType::Nsfw, 1, &format!("u{}", i), None))
            .collect();
        let (tuner, guard) = tuner_with_records(records).await;

        let report = tuner.run_once(now()).await;
        assert_eq!(guard.active().media_config().nsfw_sensitivity, 1.0);
        assert!(report
            .adjustments
            .iter()
            .any(|a| a.parameter == "nsfw_sensitivity" && a.new_value == 1.0));

        // Already at maximum: second pass records nothing.
        let report = tuner.run_once(now()).await;
        assert!(report.adjustments.iter().all(|a| a.parameter != "nsfw_sensitivity"));
    }

    #[tokio::test]
    async fn test_adjustment_log_capped() {
        let (tuner, _) = tuner_with_records(vec![]).await;
        let filler: Vec<_> = (0..ADJUSTMENT_LOG_CAP + 50)
            .map(|i| {
                ThresholdAdjustment::new(
                    "spam",
                    "max_messages_per_minute",
                    i as f64,
                    i as f64,
                    "filler",
                    AdjustmentSeverity::Minor,
                    now(),
                )
            })
            .collect();
        tuner.append_adjustments(&filler);

        let log = tuner.adjustment_log();
        assert_eq!(log.len(), ADJUSTMENT_LOG_CAP);
        // Oldest entries dropped first.
        assert_eq!(log[0].old_value, 50.0);
    }

    #[tokio::test]
    async fn test_predictions_present_for_top_patterns() {
        let records: Vec<_> = (0..40)
            .map(|i| record(ThreatType::Spam, 1, &format!("u{}", i), None))
            .collect();
        let (tuner, _) = tuner_with_records(records).await;
        let report = tuner.run_once(now()).await;
        assert_eq!(report.predictions.len(), 1);
        assert_eq!(report.predictions[0].threat_type, ThreatType::Spam);
        assert!(report.predictions[0].probability > 0.0);
    }
}
