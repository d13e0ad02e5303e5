//! LLM integration for transcript analysis
//!
//! Features:
//! - OpenAI-compatible and Claude backends behind one [`LlmBackend`] trait
//! - Bounded retries with exponential backoff for transient failures
//! - Backend selection from [`voice_webhook_config::LlmConfig`]

pub mod backend;
pub mod claude;
pub mod prompt;

pub use backend::{BackendConfig, FinishReason, GenerationResult, LlmBackend, OpenAIBackend};
pub use claude::ClaudeBackend;
pub use prompt::{Message, Role};

use std::sync::Arc;
use thiserror::Error;
use voice_webhook_config::{LlmConfig, LlmProvider};

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

/// Build the backend selected by configuration
pub fn create_backend(config: &LlmConfig) -> Result<Arc<dyn LlmBackend>, LlmError> {
    let backend_config = BackendConfig::from(config);
    tracing::info!(
        provider = ?config.provider,
        model = %backend_config.model,
        endpoint = %backend_config.endpoint,
        "Creating LLM backend"
    );

    Ok(match config.provider {
        LlmProvider::OpenAi => Arc::new(OpenAIBackend::new(backend_config)?),
        LlmProvider::Claude => Arc::new(ClaudeBackend::new(backend_config)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(LlmError::Network("reset".into()).is_retryable());
        assert!(!LlmError::Api("401".into()).is_retryable());
        assert!(!LlmError::InvalidResponse("eof".into()).is_retryable());
    }

    #[test]
    fn test_create_backend_by_provider() {
        let mut config = LlmConfig {
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        assert_eq!(create_backend(&config).unwrap().model_name(), "gpt-4o");

        config.provider = LlmProvider::Claude;
        config.model = "claude-3-5-sonnet-latest".to_string();
        assert_eq!(
            create_backend(&config).unwrap().model_name(),
            "claude-3-5-sonnet-latest"
        );

        config.api_key = None;
        assert!(create_backend(&config).is_err());
    }
}
