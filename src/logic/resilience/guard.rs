//! Resilient Execution Wrapper
//!
//! Wraps one primary service instance plus N ordered backups behind a
//! CLOSED / OPEN / HALF_OPEN circuit breaker with automatic failover.
//! Dispatch is a typed `invoke` core - callers pass a closure against the
//! active instance, so there is no dynamic method lookup anywhere.
//!
//! Failover never selects the primary directly; the primary only comes back
//! through the CLOSED-from-backup restore path.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::types::{
    ActiveInstance, CircuitConfig, CircuitHealth, CircuitMetrics, CircuitState, GuardError,
    TransitionEvent,
};

/// Rolling call history horizon (seconds)
const SAMPLE_WINDOW_SECS: i64 = 3_600;

type TransitionCallback = Box<dyn Fn(&TransitionEvent) + Send + Sync>;

// ============================================================================
// INTERNAL STATE
// ============================================================================

struct BreakerState {
    state: CircuitState,
    active: usize,
    /// Consecutive failures while CLOSED
    failure_count: u32,
    /// Successful probes while HALF_OPEN
    success_count: u32,
    /// Trial calls admitted in the current HALF_OPEN phase
    half_open_attempts: u32,
    last_transition_at: DateTime<Utc>,
    rolling_failures: VecDeque<DateTime<Utc>>,
}

struct CallSample {
    at: DateTime<Utc>,
    ok: bool,
    latency_ms: u64,
}

enum Transition {
    Failover(TransitionEvent),
    Restore(TransitionEvent),
}

// ============================================================================
// CIRCUIT GUARD
// ============================================================================

pub struct CircuitGuard<S> {
    /// `[0]` is the primary, the rest are backups in failover order
    instances: Vec<S>,
    config: CircuitConfig,
    state: Mutex<BreakerState>,
    samples: Mutex<VecDeque<CallSample>>,
    failover_callbacks: Mutex<Vec<TransitionCallback>>,
    restore_callbacks: Mutex<Vec<TransitionCallback>>,
}

impl<S> CircuitGuard<S> {
    pub fn new(primary: S, backups: Vec<S>, config: CircuitConfig) -> Self {
        let mut instances = vec![primary];
        instances.extend(backups);
        if instances.len() == 1 {
            log::warn!("circuit guard started without backup instances, degraded capacity");
        }
        Self {
            instances,
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                active: 0,
                failure_count: 0,
                success_count: 0,
                half_open_attempts: 0,
                last_transition_at: Utc::now(),
                rolling_failures: VecDeque::new(),
            }),
            samples: Mutex::new(VecDeque::new()),
            failover_callbacks: Mutex::new(Vec::new()),
            restore_callbacks: Mutex::new(Vec::new()),
        }
    }

    // ------------------------------------------------------------------
    // Invocation
    // ------------------------------------------------------------------

    /// Run one operation against the active instance under the breaker and
    /// the per-call timeout. A timed-out call counts as a failure; its
    /// side effects are not rolled back (at-most-once-effective).
    pub async fn invoke<'a, T, E, F, Fut>(&'a self, op: &'static str, call: F) -> Result<T, GuardError>
    where
        F: FnOnce(&'a S) -> Fut,
        Fut: Future<Output = Result<T, E>> + 'a,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let index = self.preflight(op, Utc::now())?;
        let started = Instant::now();
        let fut = call(&self.instances[index]);

        match tokio::time::timeout(Duration::from_millis(self.config.call_timeout_ms), fut).await {
            Ok(Ok(value)) => {
                self.record_outcome(op, true, started.elapsed().as_millis() as u64, Utc::now());
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record_outcome(op, false, started.elapsed().as_millis() as u64, Utc::now());
                Err(GuardError::Service { op, source: e.into() })
            }
            Err(_) => {
                self.record_outcome(op, false, self.config.call_timeout_ms, Utc::now());
                Err(GuardError::Timeout {
                    op,
                    timeout_ms: self.config.call_timeout_ms,
                })
            }
        }
    }

    /// Gate one call through the breaker, returning the instance index to
    /// use. OPEN transitions to HALF_OPEN here once the reset timeout has
    /// elapsed.
    fn preflight(&self, op: &'static str, now: DateTime<Utc>) -> Result<usize, GuardError> {
        let mut st = self.state.lock();
        match st.state {
            CircuitState::Closed => Ok(st.active),
            CircuitState::Open => {
                let reset_ms = self.config.reset_timeout_secs as i64 * 1_000;
                let elapsed = (now - st.last_transition_at).num_milliseconds();
                if elapsed >= reset_ms {
                    st.state = CircuitState::HalfOpen;
                    st.last_transition_at = now;
                    st.success_count = 0;
                    st.half_open_attempts = 1;
                    log::info!(
                        "circuit half-open, probing {} via {}",
                        ActiveInstance::from_index(st.active),
                        op
                    );
                    Ok(st.active)
                } else {
                    Err(GuardError::CircuitOpen {
                        op,
                        retry_after_ms: (reset_ms - elapsed).max(0) as u64,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if st.half_open_attempts >= self.config.half_open_max_attempts {
                    // Probe budget spent; wait for outcomes.
                    Err(GuardError::CircuitOpen {
                        op,
                        retry_after_ms: 1_000,
                    })
                } else {
                    st.half_open_attempts += 1;
                    Ok(st.active)
                }
            }
        }
    }

    fn record_outcome(&self, op: &'static str, ok: bool, latency_ms: u64, now: DateTime<Utc>) {
        {
            let mut samples = self.samples.lock();
            samples.push_back(CallSample { at: now, ok, latency_ms });
            let cutoff = now - chrono::Duration::seconds(SAMPLE_WINDOW_SECS);
            while samples.front().map(|s| s.at < cutoff).unwrap_or(false) {
                samples.pop_front();
            }
        }

        let transition = {
            let mut st = self.state.lock();
            match (st.state, ok) {
                (CircuitState::Closed, true) => {
                    st.failure_count = 0;
                    None
                }
                (CircuitState::Closed, false) => {
                    st.failure_count += 1;
                    push_failure(&mut st.rolling_failures, now);
                    if st.failure_count >= self.config.error_threshold {
                        log::warn!(
                            "circuit opening after {} consecutive failures on {}",
                            st.failure_count,
                            op
                        );
                        Some(self.open_locked(&mut st, now))
                    } else {
                        None
                    }
                }
                (CircuitState::HalfOpen, true) => {
                    st.success_count += 1;
                    if st.success_count >= self.config.half_open_max_attempts {
                        self.close_locked(&mut st, now)
                    } else {
                        None
                    }
                }
                (CircuitState::HalfOpen, false) => {
                    push_failure(&mut st.rolling_failures, now);
                    log::warn!("probe failed on {}, circuit re-opening", op);
                    Some(self.open_locked(&mut st, now))
                }
                // Late completion from before a transition; nothing to do.
                (CircuitState::Open, _) => None,
            }
        };

        match transition {
            // A no-backup failover is a no-op; listeners only hear real moves.
            Some(Transition::Failover(event)) if event.from_instance != event.to_instance => {
                self.fire(&self.failover_callbacks, &event)
            }
            Some(Transition::Failover(_)) => {}
            Some(Transition::Restore(event)) => self.fire(&self.restore_callbacks, &event),
            None => {}
        }
    }

    /// OPEN transition with failover: primary -> backup[0],
    /// backup[i] -> backup[(i+1) mod N]. Never back to primary directly.
    fn open_locked(&self, st: &mut BreakerState, now: DateTime<Utc>) -> Transition {
        let from = st.active;
        let backups = self.instances.len() - 1;
        if backups == 0 {
            log::warn!("no backup instances available, failover is a no-op (degraded capacity)");
        } else {
            st.active = if st.active == 0 { 1 } else { (st.active % backups) + 1 };
        }

        st.state = CircuitState::Open;
        st.last_transition_at = now;
        st.failure_count = 0;
        st.success_count = 0;
        st.half_open_attempts = 0;

        let event = TransitionEvent {
            from_instance: ActiveInstance::from_index(from),
            to_instance: ActiveInstance::from_index(st.active),
            state: CircuitState::Open,
            at: now,
        };
        if from != st.active {
            log::warn!("failover: {} -> {}", event.from_instance, event.to_instance);
        }
        Transition::Failover(event)
    }

    /// CLOSED transition; from a backup this additionally restores the
    /// primary.
    fn close_locked(&self, st: &mut BreakerState, now: DateTime<Utc>) -> Option<Transition> {
        let from = st.active;
        st.state = CircuitState::Closed;
        st.last_transition_at = now;
        st.failure_count = 0;
        st.success_count = 0;
        st.half_open_attempts = 0;

        if from != 0 {
            st.active = 0;
            let event = TransitionEvent {
                from_instance: ActiveInstance::from_index(from),
                to_instance: ActiveInstance::Primary,
                state: CircuitState::Closed,
                at: now,
            };
            log::info!("circuit closed, restored to primary from {}", event.from_instance);
            Some(Transition::Restore(event))
        } else {
            log::info!("circuit closed");
            None
        }
    }

    /// Callbacks run synchronously; a panicking callback is caught and
    /// logged, never propagated.
    fn fire(&self, callbacks: &Mutex<Vec<TransitionCallback>>, event: &TransitionEvent) {
        for callback in callbacks.lock().iter() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
                let what = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::error!("transition callback panicked: {}", what);
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle hooks
    // ------------------------------------------------------------------

    pub fn on_failover<F>(&self, callback: F)
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        self.failover_callbacks.lock().push(Box::new(callback));
    }

    pub fn on_restore<F>(&self, callback: F)
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        self.restore_callbacks.lock().push(Box::new(callback));
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn health(&self) -> CircuitHealth {
        let st = self.state.lock();
        CircuitHealth {
            state: st.state,
            active_instance: ActiveInstance::from_index(st.active),
            failure_count: st.failure_count,
            success_count: st.success_count,
            last_transition_at: st.last_transition_at,
            backups_available: self.instances.len() - 1,
        }
    }

    pub fn circuit_metrics(&self) -> CircuitMetrics {
        let samples = self.samples.lock();
        let total = samples.len();
        let failures = samples.iter().filter(|s| !s.ok).count();
        let error_rate = if total > 0 {
            failures as f32 / total as f32
        } else {
            0.0
        };
        let avg_latency_ms = if total > 0 {
            samples.iter().map(|s| s.latency_ms as f64).sum::<f64>() / total as f64
        } else {
            0.0
        };
        CircuitMetrics {
            total_calls: total,
            error_rate,
            avg_latency_ms,
            error_budget_remaining: (self.config.error_budget - error_rate).max(0.0),
        }
    }

    /// Current traffic target. Configuration reads/writes go straight to
    /// the active instance without breaker accounting - they are local and
    /// must keep working while the circuit is open.
    pub fn active(&self) -> &S {
        &self.instances[self.state.lock().active]
    }

    /// All instances, primary first. Used by maintenance passes that must
    /// touch every redundant copy.
    pub fn instances(&self) -> &[S] {
        &self.instances
    }
}

fn push_failure(failures: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
    failures.push_back(now);
    let cutoff = now - chrono::Duration::seconds(SAMPLE_WINDOW_SECS);
    while failures.front().map(|&t| t < cutoff).unwrap_or(false) {
        failures.pop_front();
    }
}

// ============================================================================
// TESTS
// ============================================================================
