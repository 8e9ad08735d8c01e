//! Resilience Types
//!
//! Breaker states, configuration and inspection snapshots for the
//! resilient-execution wrapper. No logic here - only types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// CIRCUIT STATE
// ============================================================================

/// Breaker state. Transitions follow only
/// CLOSED -> OPEN -> HALF_OPEN -> {CLOSED | OPEN}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls pass straight through
    Closed,
    /// Known-bad path, calls fail fast
    Open,
    /// Bounded trial traffic against the active instance
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// ACTIVE INSTANCE
// ============================================================================

/// Which redundant instance is receiving traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveInstance {
    Primary,
    Backup(usize),
}

impl ActiveInstance {
    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            ActiveInstance::Primary
        } else {
            ActiveInstance::Backup(index - 1)
        }
    }
}

impl std::fmt::Display for ActiveInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActiveInstance::Primary => write!(f, "primary"),
            ActiveInstance::Backup(i) => write!(f, "backup[{}]", i),
        }
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive failures in CLOSED before the circuit opens
    pub error_threshold: u32,
    /// Time spent OPEN before the next call probes HALF_OPEN (seconds)
    pub reset_timeout_secs: u64,
    /// Successful probes required to close from HALF_OPEN; also the bound
    /// on trial calls let through
    pub half_open_max_attempts: u32,
    /// Hard per-call timeout (milliseconds); a timed-out call is a failure
    pub call_timeout_ms: u64,
    /// Failure ratio the rolling window is budgeted for
    pub error_budget: f32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            error_threshold: 5,
            reset_timeout_secs: 30,
            half_open_max_attempts: 3,
            call_timeout_ms: 5_000,
            error_budget: 0.1,
        }
    }
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, Error)]
pub enum GuardError {
    /// Fail-fast while OPEN; the caller retries with backoff
    #[error("circuit open on {op}, retry after {retry_after_ms} ms")]
    CircuitOpen { op: &'static str, retry_after_ms: u64 },

    /// Per-call timeout elapsed; counted as a failure
    #[error("{op} timed out after {timeout_ms} ms")]
    Timeout { op: &'static str, timeout_ms: u64 },

    /// The wrapped operation itself failed
    #[error("{op} failed: {source}")]
    Service {
        op: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl GuardError {
    /// Both open-circuit and service errors are retryable from the
    /// connector's perspective.
    pub fn is_retryable(&self) -> bool {
        true
    }
}

// ============================================================================
// INSPECTION SNAPSHOTS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CircuitHealth {
    pub state: CircuitState,
    pub active_instance: ActiveInstance,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_transition_at: DateTime<Utc>,
    pub backups_available: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitMetrics {
    /// Calls in the rolling window (last hour)
    pub total_calls: usize,
    pub error_rate: f32,
    pub avg_latency_ms: f64,
    /// `max(0, error_budget - recent_failure_ratio)`
    pub error_budget_remaining: f32,
}

/// Payload handed to failover/restore callbacks
#[derive(Debug, Clone, Serialize)]
pub struct TransitionEvent {
    pub from_instance: ActiveInstance,
    pub to_instance: ActiveInstance,
    pub state: CircuitState,
    pub at: DateTime<Utc>,
}
