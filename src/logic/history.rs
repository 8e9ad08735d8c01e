//! Historical Record Store Contract
//!
//! Persistence collaborator for audit records, reputation and per-community
//! configuration. Assumed eventually-consistent with at-least-once write
//! semantics - duplicate audit records are tolerable. A bounded in-memory
//! implementation ships with the crate for tests and embedding.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::policy::profile::ProfileOverride;
use super::types::ThreatRecord;

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history store unavailable: {0}")]
    Unavailable(String),
    #[error("history write failed: {0}")]
    WriteFailed(String),
}

// ============================================================================
// STORED SHAPES
// ============================================================================

/// Reputation summary for an entity within one community
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationSummary {
    /// 0 - 100, neutral entities start at 50
    pub score: f32,
    pub violations: u32,
    pub positive_actions: u32,
}

impl Default for ReputationSummary {
    fn default() -> Self {
        Self {
            score: 50.0,
            violations: 0,
            positive_actions: 0,
        }
    }
}

/// Per-community moderation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityConfig {
    /// Default aggressiveness level for the community (1 - 10)
    pub default_level: u8,
    /// Optional floor on the effective AI confidence threshold
    pub confidence_floor: Option<f32>,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            default_level: crate::constants::DEFAULT_COMMUNITY_LEVEL,
            confidence_floor: None,
        }
    }
}

/// Manual operator override for a single entity within a community
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityOverride {
    /// Explicit aggressiveness level, clamped to [1, 10] on application
    pub level: Option<u8>,
    /// Field-level threshold overrides, taking precedence over the level
    #[serde(default)]
    pub profile: ProfileOverride,
}

// ============================================================================
// HISTORY STORE TRAIT
// ============================================================================

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record_threat(&self, entry: ThreatRecord) -> Result<(), HistoryError>;

    /// Most recent records first, at most `limit` entries.
    async fn query_recent(&self, limit: usize) -> Result<Vec<ThreatRecord>, HistoryError>;

    async fn reputation(
        &self,
        entity_id: &str,
        community_id: &str,
    ) -> Result<ReputationSummary, HistoryError>;

    async fn adjust_reputation(
        &self,
        entity_id: &str,
        community_id: &str,
        delta: i32,
    ) -> Result<(), HistoryError>;

    async fn community_config(
        &self,
        community_id: &str,
    ) -> Result<Option<CommunityConfig>, HistoryError>;

    async fn entity_override(
        &self,
        entity_id: &str,
        community_id: &str,
    ) -> Result<Option<EntityOverride>, HistoryError>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

const MEMORY_RECORD_CAP: usize = 10_000;

/// Bounded in-memory history store. Backs the test suite and small
/// single-process deployments; durable stores implement the same trait.
pub struct MemoryHistoryStore {
    records: RwLock<VecDeque<ThreatRecord>>,
    reputations: RwLock<HashMap<(String, String), ReputationSummary>>,
    configs: RwLock<HashMap<String, CommunityConfig>>,
    overrides: RwLock<HashMap<(String, String), EntityOverride>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            reputations: RwLock::new(HashMap::new()),
            configs: RwLock::new(HashMap::new()),
            overrides: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_community_config(&self, community_id: &str, config: CommunityConfig) {
        self.configs.write().insert(community_id.to_string(), config);
    }

    pub fn set_entity_override(&self, entity_id: &str, community_id: &str, ov: EntityOverride) {
        self.overrides
            .write()
            .insert((entity_id.to_string(), community_id.to_string()), ov);
    }

    pub fn set_reputation(&self, entity_id: &str, community_id: &str, score: f32) {
        self.reputations
            .write()
            .entry((entity_id.to_string(), community_id.to_string()))
            .or_default()
            .score = score.clamp(0.0, 100.0);
    }

    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn record_threat(&self, entry: ThreatRecord) -> Result<(), HistoryError> {
        let mut records = self.records.write();
        records.push_front(entry);
        while records.len() > MEMORY_RECORD_CAP {
            records.pop_back();
        }
        Ok(())
    }

    async fn query_recent(&self, limit: usize) -> Result<Vec<ThreatRecord>, HistoryError> {
        Ok(self.records.read().iter().take(limit).cloned().collect())
    }

    async fn reputation(
        &self,
        entity_id: &str,
        community_id: &str,
    ) -> Result<ReputationSummary, HistoryError> {
        Ok(self
            .reputations
            .read()
            .get(&(entity_id.to_string(), community_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn adjust_reputation(
        &self,
        entity_id: &str,
        community_id: &str,
        delta: i32,
    ) -> Result<(), HistoryError> {
        let mut reputations = self.reputations.write();
        let entry = reputations
            .entry((entity_id.to_string(), community_id.to_string()))
            .or_default();
        entry.score = (entry.score + delta as f32).clamp(0.0, 100.0);
        if delta < 0 {
            entry.violations += 1;
        } else if delta > 0 {
            entry.positive_actions += 1;
        }
        Ok(())
    }

    async fn community_config(
        &self,
        community_id: &str,
    ) -> Result<Option<CommunityConfig>, HistoryError> {
        Ok(self.configs.read().get(community_id).cloned())
    }

    async fn entity_override(
        &self,
        entity_id: &str,
        community_id: &str,
    ) -> Result<Option<EntityOverride>, HistoryError> {
        Ok(self
            .overrides
            .read()
            .get(&(entity_id.to_string(), community_id.to_string()))
            .cloned())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::types::{ModAction, Severity, ThreatType};
    use chrono::Utc;
    use uuid::Uuid;

    fn record(entity: &str) -> ThreatRecord {
        ThreatRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            entity_id: entity.to_string(),
            community_id: "c1".to_string(),
            threat_type: ThreatType::Spam,
            severity: Severity::Medium,
            action: ModAction::Mute,
            technique: None,
            confidence: 0.8,
        }
    }

    #[tokio::test]
    async fn test_records_newest_first_and_capped() {
        let store = MemoryHistoryStore::new();
        for i in 0..5 {
            store.record_threat(record(&format!("u{}", i))).await.unwrap();
        }
        let recent = store.query_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].entity_id, "u4");
    }

    #[tokio::test]
    async fn test_reputation_clamped() {
        let store = MemoryHistoryStore::new();
        store.adjust_reputation("u1", "c1", -200).await.unwrap();
        let rep = store.reputation("u1", "c1").await.unwrap();
        assert_eq!(rep.score, 0.0);
        assert_eq!(rep.violations, 1);

        store.adjust_reputation("u1", "c1", 40).await.unwrap();
        let rep = store.reputation("u1", "c1").await.unwrap();
        assert_eq!(rep.score, 40.0);
        assert_eq!(rep.positive_actions, 1);
    }

    #[tokio::test]
    async fn test_unknown_entity_is_neutral() {
        let store = MemoryHistoryStore::new();
        let rep = store.reputation("ghost", "c1").await.unwrap();
        assert_eq!(rep.score, 50.0);
        assert!(store.entity_override("ghost", "c1").await.unwrap().is_none());
    }
}
