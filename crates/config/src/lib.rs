//! Configuration management for the call webhook service
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, then `config/{env}`)
//! - Environment variables (`VOICE_WEBHOOK__` prefix, `__` separator)
//! - The unprefixed credentials the platform deployment already uses
//!   (`VAPI_API_KEY`, `OPENAI_API_KEY`, `WEBHOOK_SECRET`, ...)

pub mod settings;

pub use settings::{
    load_settings, load_settings_from, AnalysisConfig, AuthConfig, DispatchConfig, LlmConfig,
    LlmProvider, ObservabilityConfig, PersistenceConfig, PlatformConfig, ReconcilerConfig,
    RuntimeEnvironment, ServerConfig, Settings, StoreBackend, ENV_PREFIX,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(path) => ConfigError::FileNotFound(path),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}
