//! Pattern Mining
//!
//! Groups historical records by threat type into `ThreatPattern` summaries
//! and derives attack predictions from them. Pure functions over the record
//! slice - the tuner engine owns all side effects.

use std::collections::HashMap;

use chrono::{DateTime, Timelike, Utc};

use crate::logic::types::{Severity, ThreatRecord, ThreatType};

use super::types::{AttackPrediction, ThreatPattern};

/// Patterns considered for prediction, highest frequency first
const PREDICTION_TOP_N: usize = 3;

/// Techniques reported per pattern
const TOP_TECHNIQUES: usize = 5;

/// Records of one type by one entity before it counts as a repeat offender
const REPEAT_OFFENDER_MIN: usize = 3;

/// An hour bucket needs at least this many records to count as a peak
const PEAK_HOUR_MIN: usize = 2;

// ============================================================================
// MINING
// ============================================================================

pub fn mine_patterns(records: &[ThreatRecord]) -> Vec<ThreatPattern> {
    let mut by_type: HashMap<ThreatType, Vec<&ThreatRecord>> = HashMap::new();
    for record in records {
        by_type.entry(record.threat_type).or_default().push(record);
    }

    let mut patterns: Vec<ThreatPattern> = by_type
        .into_iter()
        .map(|(threat_type, group)| summarize(threat_type, &group))
        .collect();
    patterns.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    patterns
}

fn summarize(threat_type: ThreatType, group: &[&ThreatRecord]) -> ThreatPattern {
    // Dominant severity: most common, higher severity wins ties.
    let mut severity_counts: HashMap<Severity, usize> = HashMap::new();
    for record in group {
        *severity_counts.entry(record.severity).or_default() += 1;
    }
    let dominant_severity = severity_counts
        .into_iter()
        .max_by_key(|&(severity, count)| (count, severity))
        .map(|(severity, _)| severity)
        .unwrap_or(Severity::Low);

    // Techniques by frequency.
    let mut technique_counts: HashMap<&str, usize> = HashMap::new();
    for record in group {
        if let Some(technique) = &record.technique {
            *technique_counts.entry(technique.as_str()).or_default() += 1;
        }
    }
    let mut techniques: Vec<(&str, usize)> = technique_counts.into_iter().collect();
    techniques.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    let top_techniques = techniques
        .into_iter()
        .take(TOP_TECHNIQUES)
        .map(|(t, _)| t.to_string())
        .collect();

    // Per-hour buckets; a peak needs enough mass to mean anything.
    let mut hour_counts = [0usize; 24];
    for record in group {
        hour_counts[record.timestamp.hour() as usize] += 1;
    }
    let max_bucket = hour_counts.iter().copied().max().unwrap_or(0);
    let threshold = (max_bucket / 2).max(PEAK_HOUR_MIN);
    let peak_hours: Vec<u32> = (0..24u32)
        .filter(|&h| hour_counts[h as usize] >= threshold)
        .collect();

    let mut affected_communities: Vec<String> = group
        .iter()
        .map(|r| r.community_id.clone())
        .collect::<std::collections::HashSet<_>>()
        .into_iter()
        .collect();
    affected_communities.sort();

    let mut offender_counts: HashMap<&str, usize> = HashMap::new();
    for record in group {
        *offender_counts.entry(record.entity_id.as_str()).or_default() += 1;
    }
    let mut repeat_offenders: Vec<String> = offender_counts
        .into_iter()
        .filter(|&(_, count)| count >= REPEAT_OFFENDER_MIN)
        .map(|(entity, _)| entity.to_string())
        .collect();
    repeat_offenders.sort();

    ThreatPattern {
        threat_type,
        frequency: group.len(),
        dominant_severity,
        top_techniques,
        peak_hours,
        affected_communities,
        repeat_offenders,
    }
}

// ============================================================================
// PREDICTION
// ============================================================================

/// Probability from historical frequency, doubled inside a peak-hour
/// bucket, raised again for high/critical dominant severity, capped at
/// 0.99. Timeframe is "now" inside a peak window, else hours until the
/// next peak (wrapping past midnight).
pub fn predict_attacks(patterns: &[ThreatPattern], now: DateTime<Utc>) -> Vec<AttackPrediction> {
    let current_hour = now.hour();

    patterns
        .iter()
        .take(PREDICTION_TOP_N)
        .map(|pattern| {
            let mut probability = (pattern.frequency as f32 * 0.01).min(0.45);
            let in_peak = pattern.peak_hours.contains(&current_hour);
            if in_peak {
                probability *= 2.0;
            }
            if pattern.dominant_severity.is_high() {
                probability *= 1.25;
            }
            probability = probability.min(0.99);

            let expected_timeframe = if in_peak {
                "now".to_string()
            } else if let Some(delta) = hours_until_next_peak(&pattern.peak_hours, current_hour) {
                format!("in {}h", delta)
            } else {
                "within 24h".to_string()
            };

            AttackPrediction {
                threat_type: pattern.threat_type,
                probability,
                expected_timeframe,
                basis: format!(
                    "{} records, dominant severity {}",
                    pattern.frequency,
                    pattern.dominant_severity.as_str()
                ),
            }
        })
        .collect()
}

fn hours_until_next_peak(peak_hours: &[u32], current_hour: u32) -> Option<u32> {
    peak_hours
        .iter()
        .map(|&peak| (peak + 24 - current_hour) % 24)
        .filter(|&delta| delta > 0)
        .min()
}

// ============================================================================
// TESTS
// ============================================================================
