//! Voice webhook server
//!
//! Receives call events from the voice platform, answers function calls
//! synchronously and hands finished calls to the analysis pipeline.

pub mod auth;
pub mod background;
pub mod http;
pub mod metrics;
pub mod state;
pub mod webhook;

pub use auth::webhook_auth;
pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppContext;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use voice_webhook_analysis::AnalysisError;
use voice_webhook_config::ConfigError;
use voice_webhook_core::PipelineError;
use voice_webhook_llm::LlmError;
use voice_webhook_persistence::PersistenceError;
use voice_webhook_platform::PlatformError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Analysis setup error: {0}")]
    AnalysisSetup(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AnalysisError> for ServerError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Persistence(e) => ServerError::Persistence(e),
            AnalysisError::Pipeline(e) => ServerError::Pipeline(e),
            AnalysisError::Schema(msg) => ServerError::AnalysisSetup(msg),
        }
    }
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Pipeline(e) => Self::status_for(e),
            // The platform redelivers on 5xx; the record is retried then
            ServerError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Auth(_) => StatusCode::UNAUTHORIZED,
            ServerError::Config(_)
            | ServerError::Platform(_)
            | ServerError::Llm(_)
            | ServerError::AnalysisSetup(_)
            | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Status for a pipeline failure
    ///
    /// Tool timeouts and failures are still answered with 200: the body
    /// carries the error and a spoken fallback for the conversation.
    pub fn status_for(err: &PipelineError) -> StatusCode {
        match err {
            PipelineError::MalformedEventPayload { .. } | PipelineError::UnknownTool(_) => {
                StatusCode::BAD_REQUEST
            },
            PipelineError::UnrecognizedEventKind(_)
            | PipelineError::ToolTimeout { .. }
            | PipelineError::ToolExecutionError { .. } => StatusCode::OK,
            PipelineError::ReconciliationPushFailed { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::AnalysisExtractionFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable label for response bodies and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::Pipeline(e) => e.kind(),
            ServerError::Persistence(_) => "PersistenceUnavailable",
            ServerError::Auth(_) => "Unauthorized",
            _ => "Internal",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "Request failed");
        }
        let body = serde_json::json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}
