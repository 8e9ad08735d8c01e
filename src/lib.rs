//! ChatShield Core - Adaptive Abuse-Mitigation Decision Engine
//!
//! Real-time threat decisions for community chat platforms: spam floods,
//! raids, filter evasion and disallowed media. A platform connector feeds
//! inbound events in and executes the returned verdicts; this crate owns
//! the decision-making.
//!
//! Three tightly coupled pieces:
//! - [`CircuitGuard`](logic::resilience::CircuitGuard) - circuit-breaker
//!   failure isolation with automatic failover between redundant pipeline
//!   instances
//! - [`DetectionPipeline`](logic::detection::DetectionPipeline) - the
//!   multi-stage scoring engine producing per-event verdicts
//! - [`AdaptiveTuner`](logic::tuner::AdaptiveTuner) - periodic controller
//!   mining historical verdicts to predict attack windows and re-tune the
//!   live thresholds
//!
//! [`ShieldEngine`](logic::engine::ShieldEngine) wires the three together
//! and owns the background timers.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use chatshield_core::logic::classifier::NullClassifier;
//! use chatshield_core::logic::engine::{EngineConfig, ShieldEngine};
//! use chatshield_core::logic::history::MemoryHistoryStore;
//! use chatshield_core::logic::types::MessageEvent;
//!
//! # async fn example() {
//! let engine = ShieldEngine::new(
//!     Arc::new(NullClassifier),
//!     Arc::new(MemoryHistoryStore::new()),
//!     EngineConfig::default(),
//! );
//! engine.start();
//!
//! let verdict = engine
//!     .evaluate_message(&MessageEvent {
//!         entity_id: "user-1".to_string(),
//!         community_id: "community-1".to_string(),
//!         content: "hello".to_string(),
//!         attachments: vec![],
//!     })
//!     .await
//!     .expect("circuit closed");
//! println!("action: {}", verdict.action);
//!
//! engine.shutdown();
//! # }
//! ```

pub mod constants;
pub mod logic;

pub use logic::classifier::{Classifier, ClassifierError, NullClassifier};
pub use logic::detection::{DetectionPipeline, PipelineError};
pub use logic::engine::{EngineConfig, ShieldEngine};
pub use logic::history::{HistoryStore, MemoryHistoryStore};
pub use logic::resilience::{CircuitConfig, CircuitGuard, CircuitState, GuardError};
pub use logic::tuner::{AdaptiveTuner, TunerReport};
pub use logic::types::{JoinEvent, MessageEvent, ModAction, Severity, ThreatType, Verdict};
