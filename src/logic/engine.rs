//! Engine Facade
//!
//! Explicitly constructed owner of the pipeline instances, the resilient
//! wrapper, the adaptive tuner and the background timers. The platform
//! connector talks to this type; `shutdown()` releases every spawned task.
//!
//! Evaluation calls go through the circuit breaker as named operations.
//! Configuration reads/writes bypass breaker accounting on purpose - they
//! are local, cannot fail like I/O, and must keep working while the circuit
//! is open.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::constants::{APP_NAME, APP_VERSION, SWEEP_INTERVAL_SECS};
use crate::logic::classifier::Classifier;
use crate::logic::detection::{DetectionPipeline, PipelineStats};
use crate::logic::history::HistoryStore;
use crate::logic::policy::config::ModerationConfig;
use crate::logic::resilience::{
    CircuitConfig, CircuitGuard, CircuitHealth, CircuitMetrics, GuardError,
};
use crate::logic::tuner::{AdaptiveTuner, TunerReport};
use crate::logic::types::{JoinEvent, MessageEvent, Verdict};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub circuit: CircuitConfig,
    pub moderation: ModerationConfig,
    /// Redundant pipeline instances behind the primary. Backups start with
    /// independent empty state - failover is fail-open-with-fresh-state.
    pub backup_instances: usize,
    pub sweep_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            circuit: CircuitConfig::default(),
            moderation: ModerationConfig::default(),
            backup_instances: 1,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ShieldEngine {
    guard: Arc<CircuitGuard<DetectionPipeline>>,
    tuner: Arc<AdaptiveTuner>,
    sweep_interval_secs: u64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ShieldEngine {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        history: Arc<dyn HistoryStore>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let primary = DetectionPipeline::with_config(
            classifier.clone(),
            history.clone(),
            config.moderation.clone(),
        );
        let backups = (0..config.backup_instances)
            .map(|_| {
                DetectionPipeline::with_config(
                    classifier.clone(),
                    history.clone(),
                    config.moderation.clone(),
                )
            })
            .collect();
        let guard = Arc::new(CircuitGuard::new(primary, backups, config.circuit));
        let tuner = Arc::new(AdaptiveTuner::new(guard.clone(), history));

        Arc::new(Self {
            guard,
            tuner,
            sweep_interval_secs: config.sweep_interval_secs,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the sweep and tuning timers. Safe to call once; subsequent
    /// calls are no-ops.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        let guard = self.guard.clone();
        let interval_secs = self.sweep_interval_secs;
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            interval.tick().await;
            loop {
                interval.tick().await;
                let now = Utc::now();
                // Every redundant instance carries its own windows.
                for pipeline in guard.instances() {
                    pipeline.sweep(now);
                }
            }
        }));
        tasks.push(self.tuner.clone().spawn());

        log::info!("{} engine started (v{})", APP_NAME, APP_VERSION);
    }

    /// Abort all background timers. Idempotent.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.is_empty() {
            return;
        }
        for task in tasks.drain(..) {
            task.abort();
        }
        log::info!("engine stopped, timers released");
    }

    // ------------------------------------------------------------------
    // Guarded evaluation operations
    // ------------------------------------------------------------------

    pub async fn evaluate_message(&self, msg: &MessageEvent) -> Result<Verdict, GuardError> {
        self.guard
            .invoke("evaluate_message", |pipeline| pipeline.evaluate_message(msg))
            .await
    }

    pub async fn evaluate_join(&self, join: &JoinEvent) -> Result<Verdict, GuardError> {
        self.guard
            .invoke("evaluate_join", |pipeline| pipeline.evaluate_join(join))
            .await
    }

    // ------------------------------------------------------------------
    // Inspection and control
    // ------------------------------------------------------------------

    /// The active pipeline instance, for configuration reads/writes and
    /// operator control.
    pub fn pipeline(&self) -> &DetectionPipeline {
        self.guard.active()
    }

    pub fn guard(&self) -> &Arc<CircuitGuard<DetectionPipeline>> {
        &self.guard
    }

    pub fn tuner(&self) -> &Arc<AdaptiveTuner> {
        &self.tuner
    }

    /// On-demand tuning pass.
    pub async fn run_tuning_pass(&self) -> TunerReport {
        self.tuner.run_once(Utc::now()).await
    }

    pub fn health(&self) -> CircuitHealth {
        self.guard.health()
    }

    pub fn circuit_metrics(&self) -> CircuitMetrics {
        self.guard.circuit_metrics()
    }

    pub fn pipeline_stats(&self) -> PipelineStats {
        self.guard.active().stats(Utc::now())
    }
}

impl Drop for ShieldEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::classifier::{
        BypassAnalysis, BypassPattern, ClassifierError, ContentAnalysis, ImageAnalysis,
        NullClassifier,
    };
    use crate::logic::history::MemoryHistoryStore;
    use crate::logic::resilience::{ActiveInstance, CircuitState};
    use crate::logic::types::{ModAction, Severity, ThreatType};
    use async_trait::async_trait;

    fn msg(content: &str) -> MessageEvent {
        MessageEvent {
            entity_id: "u1".to_string(),
            community_id: "c1".to_string(),
            content: content.to_string(),
            attachments: vec![],
        }
    }

    fn engine() -> Arc<ShieldEngine> {
        ShieldEngine::new(
            Arc::new(NullClassifier),
            Arc::new(MemoryHistoryStore::new()),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_message_flows_through_guard() {
        let engine = engine();
        let verdict = engine.evaluate_message(&msg("good evening")).await.unwrap();
        assert!(verdict.is_allow());
        assert_eq!(engine.health().state, CircuitState::Closed);
        assert_eq!(engine.circuit_metrics().total_calls, 1);
    }

    #[tokio::test]
    async fn test_kick_verdict_through_guard() {
        let engine = engine();
        let verdict = engine
            .evaluate_message(&msg("time to raid this server"))
            .await
            .unwrap();
        assert_eq!(verdict.action, ModAction::Kick);
    }

    /// Classifier that hangs long enough to trip the per-call timeout.
    struct HangingClassifier;

    #[async_trait]
    impl Classifier for HangingClassifier {
        async fn classify_bypass(
            &self,
            _content: &str,
            _known: &[BypassPattern],
        ) -> Result<BypassAnalysis, ClassifierError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Err(ClassifierError::Unavailable("hung".to_string()))
        }

        async fn classify_content(
            &self,
            _content: &str,
            _recent: &[String],
        ) -> Result<ContentAnalysis, ClassifierError> {
            Ok(ContentAnalysis {
                confidence: 0.0,
                threat_level: Severity::Low,
                threat_type: ThreatType::Toxicity,
                reasoning: String::new(),
            })
        }

        async fn classify_image(&self, _base64: &str) -> Result<ImageAnalysis, ClassifierError> {
            Err(ClassifierError::Unavailable("hung".to_string()))
        }
    }

    #[tokio::test]
    async fn test_slow_pipeline_opens_circuit_and_fails_over() {
        let config = EngineConfig {
            circuit: CircuitConfig {
                error_threshold: 2,
                reset_timeout_secs: 3_600,
                half_open_max_attempts: 1,
                call_timeout_ms: 30,
                error_budget: 0.1,
            },
            ..Default::default()
        };
        let engine = ShieldEngine::new(
            Arc::new(HangingClassifier),
            Arc::new(MemoryHistoryStore::new()),
            config,
        );

        for _ in 0..2 {
            let err = engine.evaluate_message(&msg("hello")).await.unwrap_err();
            assert!(matches!(err, GuardError::Timeout { .. }));
        }

        let health = engine.health();
        assert_eq!(health.state, CircuitState::Open);
        assert_eq!(health.active_instance, ActiveInstance::Backup(0));

        // Fail-fast while open: retryable error, no instance touched.
        let err = engine.evaluate_message(&msg("hello")).await.unwrap_err();
        assert!(matches!(err, GuardError::CircuitOpen { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_start_and_shutdown_release_timers() {
        let engine = engine();
        engine.start();
        engine.start(); // no-op
        engine.shutdown();
        engine.shutdown(); // idempotent

        // Still usable after shutdown; only timers are gone.
        let verdict = engine.evaluate_message(&msg("after shutdown")).await.unwrap();
        assert!(verdict.is_allow());
    }

    #[tokio::test]
    async fn test_config_surface_reaches_active_instance() {
        let engine = engine();
        let updated = engine.pipeline().update_spam_config(
            &crate::logic::policy::config::SpamConfigPatch {
                max_messages_per_minute: Some(4),
                ..Default::default()
            },
        );
        assert_eq!(updated.max_messages_per_minute, 4);
        assert_eq!(engine.pipeline().spam_config().max_messages_per_minute, 4);
    }
}
