//! Error taxonomy shared by every stage of the call-event pipeline
//!
//! Each stage (classifier, dispatcher, analyzer, reconciler) reports its
//! failures as a [`PipelineError`]. The server maps the variant to an HTTP
//! status and uses [`PipelineError::kind`] as a stable label in response
//! bodies and metrics.

use std::error::Error as StdError;
use thiserror::Error;

/// Boxed cause preserved for handler failures
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A recognized event kind is missing required fields or has the wrong shape
    #[error("Malformed {kind} payload: {reason}")]
    MalformedEventPayload { kind: String, reason: String },

    /// The envelope carries a kind this service does not handle
    #[error("Unrecognized event kind: {0}")]
    UnrecognizedEventKind(String),

    /// No handler registered for the requested tool
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Handler exceeded its time budget
    #[error("Tool {tool} timed out after {timeout_ms}ms")]
    ToolTimeout { tool: String, timeout_ms: u64 },

    /// Handler ran and failed; the original cause is kept as the source
    #[error("Tool {tool} failed: {message}")]
    ToolExecutionError {
        tool: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Structured extraction did not produce a valid analysis within the retry budget
    #[error("Analysis extraction failed for call {call_id} after {attempts} attempt(s): {reason}")]
    AnalysisExtractionFailed {
        call_id: String,
        attempts: u32,
        reason: String,
    },

    /// The platform push failed (network error or non-2xx)
    #[error("Push to platform failed for call {call_id}: {reason}")]
    ReconciliationPushFailed { call_id: String, reason: String },
}

impl PipelineError {
    pub fn malformed(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedEventPayload {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Build a tool execution error that keeps the handler's error as its source
    pub fn tool_execution<E>(tool: impl Into<String>, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::ToolExecutionError {
            tool: tool.into(),
            message: cause.to_string(),
            source: Some(Box::new(cause)),
        }
    }

    /// Stable identifier of the error class
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedEventPayload { .. } => "MalformedEventPayload",
            Self::UnrecognizedEventKind(_) => "UnrecognizedEventKind",
            Self::UnknownTool(_) => "UnknownTool",
            Self::ToolTimeout { .. } => "ToolTimeout",
            Self::ToolExecutionError { .. } => "ToolExecutionError",
            Self::AnalysisExtractionFailed { .. } => "AnalysisExtractionFailed",
            Self::ReconciliationPushFailed { .. } => "ReconciliationPushFailed",
        }
    }

    /// Whether the caller made the mistake (as opposed to us or a dependency)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedEventPayload { .. } | Self::UnknownTool(_)
        )
    }
}

/// Convenience alias
pub type Result<T> = std::result::Result<T, PipelineError>;
