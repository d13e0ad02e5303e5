//! Post-call processing
//!
//! Turns an end-of-call report into a persisted [`CallAnalysisResult`]:
//! - [`TranscriptAnalyzer`]: LLM extraction with schema validation and one corrective retry
//! - [`Reconciler`]: persist-then-push with bounded exponential backoff
//! - [`IdempotencyIndex`]: per-`call_id` claims against concurrent redelivery
//! - [`CallPipeline`]: ties the three together for the webhook handler
//!
//! [`CallAnalysisResult`]: voice_webhook_core::CallAnalysisResult

pub mod analyzer;
pub mod extraction;
pub mod idempotency;
pub mod pipeline;
pub mod reconciler;

#[cfg(test)]
pub(crate) mod test_support;

pub use analyzer::{AnalysisOutcome, AnalyzerConfig, TranscriptAnalyzer, TRANSCRIPT_TOO_SHORT};
pub use extraction::{strip_code_fences, AnalysisValidator};
pub use idempotency::{ClaimGuard, IdempotencyIndex};
pub use pipeline::{CallPipeline, EndOfCallOutcome, PushHandle};
pub use reconciler::{PushOutcome, Reconciler, RecoveryReport, RetryPolicy};

use thiserror::Error;
use voice_webhook_core::PipelineError;
use voice_webhook_persistence::PersistenceError;

/// Analysis errors
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid analysis schema: {0}")]
    Schema(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
