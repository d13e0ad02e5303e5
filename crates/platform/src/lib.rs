//! Platform client
//!
//! Talks to the orchestration platform's REST API:
//! - Attach analysis results to a call as metadata
//! - Read call records for verification tooling

pub mod calls;
pub mod client;
pub mod projection;

pub use calls::{format_cost, format_duration, AssistantRef, CallSummary};
pub use client::{PlatformClient, VapiClient};
pub use projection::{format_analysis_for_platform, ANALYSIS_VERSION};

use thiserror::Error;
use voice_webhook_core::PipelineError;

/// Platform errors
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid call id: {0:?}")]
    InvalidCallId(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl PlatformError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            PlatformError::Network(_) | PlatformError::Timeout => true,
            PlatformError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// HTTP status returned by the platform, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            PlatformError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Lift into the pipeline taxonomy for a failed push of `call_id`
    pub fn into_push_failure(self, call_id: impl Into<String>) -> PipelineError {
        PipelineError::ReconciliationPushFailed {
            call_id: call_id.into(),
            reason: self.to_string(),
        }
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PlatformError::Timeout
        } else {
            PlatformError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PlatformError::Timeout.is_retryable());
        assert!(PlatformError::Api { status: 503, body: String::new() }.is_retryable());
        assert!(PlatformError::Api { status: 429, body: String::new() }.is_retryable());
        assert!(!PlatformError::Api { status: 404, body: String::new() }.is_retryable());
        assert!(!PlatformError::InvalidCallId("unknown".into()).is_retryable());
    }

    #[test]
    fn test_into_push_failure() {
        let err = PlatformError::Api { status: 503, body: "busy".into() }.into_push_failure("c9");
        assert_eq!(err.kind(), "ReconciliationPushFailed");
        assert!(err.to_string().contains("c9"));
        assert!(err.to_string().contains("503"));
    }
}
