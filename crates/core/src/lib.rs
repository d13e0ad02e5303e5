//! Core types for the call webhook service
//!
//! This crate provides the types every other crate builds on:
//! - Event classification of raw platform webhooks
//! - The call analysis data model
//! - The pipeline error taxonomy

pub mod call;
pub mod error;
pub mod events;

pub use call::{
    render_transcript, CallAnalysisResult, CallMetrics, ConversionStatus, EligibilityOutcome,
    PushState, SatisfactionLevel, Speaker, TranscriptAnalysis, TranscriptEntry,
    SATISFACTION_SCORE_RANGE,
};
pub use error::{BoxError, PipelineError, Result};
pub use events::{
    classify, classify_bytes, parse_plain_transcript, EndOfCallReport, EventEnvelope, EventKind,
    EventPayload, FunctionCallRequest, FunctionCallResult, StatusUpdate, ToolFailure,
    TranscriptUpdate,
};
