//! Moderation detection: the pipeline and its check stages.

pub mod attachments;
pub mod pipeline;
pub mod raid;
pub mod spam;
pub mod warnings;
pub mod windows;
pub mod word_filter;

pub use pipeline::{DetectionPipeline, PipelineError, PipelineStats};
pub use warnings::{StrikeOutcome, WarningLedger};
pub use word_filter::{TermCategory, WordFilter, WordHit};
