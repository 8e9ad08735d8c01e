//! Sliding Window Trackers
//!
//! Per-entity timestamp windows backing the rate checks. Bounded two ways:
//! events older than the horizon are pruned, and once the tracked-entity
//! count exceeds its bound the oldest-inserted entities are evicted. Both
//! bounds are enforced silently - capacity never surfaces as an error.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

// ============================================================================
// SLIDING WINDOWS
// ============================================================================

pub struct SlidingWindows {
    horizon: Duration,
    max_entities: usize,
    entries: HashMap<String, VecDeque<DateTime<Utc>>>,
    insertion_order: VecDeque<String>,
}

impl SlidingWindows {
    pub fn new(horizon_secs: i64, max_entities: usize) -> Self {
        Self {
            horizon: Duration::seconds(horizon_secs),
            max_entities,
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    /// Record one event and return the count within `window_secs` of `now`,
    /// including the event just recorded.
    pub fn record_and_count(&mut self, key: &str, now: DateTime<Utc>, window_secs: i64) -> usize {
        self.record(key, now);
        self.count_within(key, now, window_secs)
    }

    pub fn record(&mut self, key: &str, now: DateTime<Utc>) {
        if !self.entries.contains_key(key) {
            self.insertion_order.push_back(key.to_string());
            self.evict_over_bound();
        }
        let window = self.entries.entry(key.to_string()).or_default();
        window.push_back(now);

        let cutoff = now - self.horizon;
        while let Some(&front) = window.front() {
            if front < cutoff {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn count_within(&self, key: &str, now: DateTime<Utc>, window_secs: i64) -> usize {
        let cutoff = now - Duration::seconds(window_secs);
        self.entries
            .get(key)
            .map(|w| w.iter().filter(|&&t| t > cutoff && t <= now).count())
            .unwrap_or(0)
    }

    /// Drop horizon-expired events and empty entities.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.horizon;
        self.entries.retain(|_, window| {
            while let Some(&front) = window.front() {
                if front < cutoff {
                    window.pop_front();
                } else {
                    break;
                }
            }
            !window.is_empty()
        });
        self.insertion_order.retain(|k| self.entries.contains_key(k));
    }

    fn evict_over_bound(&mut self) {
        while self.insertion_order.len() > self.max_entities {
            if let Some(oldest) = self.insertion_order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn tracked_entities(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// DUPLICATE TRACKER
// ============================================================================

/// Recent content hashes per entity, for the duplicate-message tiers.
pub struct DuplicateTracker {
    horizon: Duration,
    max_entities: usize,
    entries: HashMap<String, VecDeque<(u64, DateTime<Utc>)>>,
    insertion_order: VecDeque<String>,
}

impl DuplicateTracker {
    pub fn new(horizon_secs: i64, max_entities: usize) -> Self {
        Self {
            horizon: Duration::seconds(horizon_secs),
            max_entities,
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    pub fn content_hash(content: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        content.trim().to_lowercase().hash(&mut hasher);
        hasher.finish()
    }

    /// Record the message and return how many copies of it (including this
    /// one) the entity sent within the horizon.
    pub fn record_and_count(&mut self, key: &str, content: &str, now: DateTime<Utc>) -> usize {
        if !self.entries.contains_key(key) {
            self.insertion_order.push_back(key.to_string());
            while self.insertion_order.len() > self.max_entities {
                if let Some(oldest) = self.insertion_order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }

        let hash = Self::content_hash(content);
        let cutoff = now - self.horizon;
        let window = self.entries.entry(key.to_string()).or_default();

        while let Some(&(_, t)) = window.front() {
            if t < cutoff {
                window.pop_front();
            } else {
                break;
            }
        }
        window.push_back((hash, now));

        window.iter().filter(|&&(h, _)| h == hash).count()
    }

    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.horizon;
        self.entries.retain(|_, window| {
            while let Some(&(_, t)) = window.front() {
                if t < cutoff {
                    window.pop_front();
                } else {
                    break;
                }
            }
            !window.is_empty()
        });
        self.insertion_order.retain(|k| self.entries.contains_key(k));
    }

    pub fn tracked_entities(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// RECENT CONTEXT
// ============================================================================

/// Small per-entity ring of recent message texts handed to the content
/// classifier as context.
pub struct RecentContext {
    ring_size: usize,
    max_entities: usize,
    entries: HashMap<String, VecDeque<String>>,
    insertion_order: VecDeque<String>,
}

impl RecentContext {
    pub fn new(ring_size: usize, max_entities: usize) -> Self {
        Self {
            ring_size,
            max_entities,
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    pub fn push(&mut self, key: &str, content: &str) {
        if !self.entries.contains_key(key) {
            self.insertion_order.push_back(key.to_string());
            while self.insertion_order.len() > self.max_entities {
                if let Some(oldest) = self.insertion_order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
        let ring = self.entries.entry(key.to_string()).or_default();
        ring.push_back(content.to_string());
        while ring.len() > self.ring_size {
            ring.pop_front();
        }
    }

    pub fn snapshot(&self, key: &str) -> Vec<String> {
        self.entries
            .get(key)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct WindowStats {
    pub message_entities: usize,
    pub join_entities: usize,
    pub duplicate_entities: usize,
}

// ============================================================================
// TESTS
// ============================================================================
