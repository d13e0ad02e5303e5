//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ConfigError;

/// Prefix for structured environment overrides, e.g. `VOICE_WEBHOOK__SERVER__PORT`
pub const ENV_PREFIX: &str = "VOICE_WEBHOOK";

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Relaxed validation, warnings only
    #[default]
    Development,
    Staging,
    /// All validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Webhook authentication
    #[serde(default)]
    pub auth: AuthConfig,

    /// Voice platform REST API
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Language model used for transcript analysis
    #[serde(default)]
    pub llm: LlmConfig,

    /// Function-call dispatch
    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Push retry policy
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_platform()?;
        self.validate_llm()?;
        self.validate_pipeline()?;
        self.validate_persistence()?;
        Ok(())
    }

    /// Fail fast when credentials the service cannot run without are absent
    ///
    /// Called at startup, before the listener binds. Kept apart from
    /// [`Settings::validate`] so tests and the CLI can load partial settings.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if self.platform.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(ConfigError::MissingField("platform.api_key".to_string()));
        }

        if self.analysis.enabled
            && self.llm.is_remote()
            && self.llm.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return Err(ConfigError::MissingField("llm.api_key".to_string()));
        }

        if self.environment.is_production() && self.auth.webhook_secret.is_none() {
            tracing::warn!("No webhook secret configured in production; webhook is unauthenticated");
        }

        Ok(())
    }

    /// Fill fields from the unprefixed variables of the existing deployment
    ///
    /// Credentials only fill fields that are still unset. `HOST`/`PORT` apply
    /// unless the prefixed variable for the same field is present.
    pub fn apply_env_fallbacks<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.platform.api_key.is_none() {
            self.platform.api_key = lookup("VAPI_API_KEY");
        }
        if self.llm.api_key.is_none() {
            self.llm.api_key = match self.llm.provider {
                LlmProvider::OpenAi => lookup("OPENAI_API_KEY"),
                LlmProvider::Claude => lookup("ANTHROPIC_API_KEY"),
            };
        }
        if self.auth.webhook_secret.is_none() {
            self.auth.webhook_secret = lookup("WEBHOOK_SECRET");
        }
        if self.server.public_url.is_none() {
            self.server.public_url = lookup("WEBHOOK_URL");
        }

        if lookup(&format!("{}__SERVER__HOST", ENV_PREFIX)).is_none() {
            if let Some(host) = lookup("HOST") {
                self.server.host = host;
            }
        }
        if lookup(&format!("{}__SERVER__PORT", ENV_PREFIX)).is_none() {
            if let Some(port) = lookup("PORT") {
                self.server.port = port
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::invalid("PORT", format!("not a port number: {}", port)))?;
            }
        }

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::invalid("server.port", "Port cannot be 0"));
        }

        if server.timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "server.timeout_seconds",
                "Timeout must be at least 1 second",
            ));
        }

        if !server.webhook_path.starts_with('/') {
            return Err(ConfigError::invalid(
                "server.webhook_path",
                format!("Must start with '/', got {:?}", server.webhook_path),
            ));
        }

        if self.auth.header_name.trim().is_empty() {
            return Err(ConfigError::invalid("auth.header_name", "Header name cannot be empty"));
        }

        if self.environment.is_production() && server.cors_enabled && server.cors_origins.is_empty() {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 This may block legitimate requests."
            );
        }

        Ok(())
    }

    fn validate_platform(&self) -> Result<(), ConfigError> {
        let platform = &self.platform;

        if !(platform.base_url.starts_with("http://") || platform.base_url.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "platform.base_url",
                format!("Must be an http(s) URL, got {:?}", platform.base_url),
            ));
        }

        if platform.timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "platform.timeout_seconds",
                "Timeout must be at least 1 second",
            ));
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;

        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(ConfigError::invalid(
                "llm.temperature",
                format!("Must be between 0.0 and 2.0, got {}", llm.temperature),
            ));
        }

        if llm.max_tokens == 0 {
            return Err(ConfigError::invalid("llm.max_tokens", "Must be at least 1"));
        }

        if llm.timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "llm.timeout_seconds",
                "Timeout must be at least 1 second",
            ));
        }

        if llm.model.trim().is_empty() {
            return Err(ConfigError::invalid("llm.model", "Model cannot be empty"));
        }

        Ok(())
    }

    fn validate_pipeline(&self) -> Result<(), ConfigError> {
        if self.dispatch.default_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "dispatch.default_timeout_ms",
                "Tool timeout must be positive",
            ));
        }

        if self.analysis.extraction_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "analysis.extraction_timeout_seconds",
                "Timeout must be at least 1 second",
            ));
        }

        if self.analysis.extraction_retries > 5 {
            return Err(ConfigError::invalid(
                "analysis.extraction_retries",
                format!("At most 5 corrective retries, got {}", self.analysis.extraction_retries),
            ));
        }

        let budget = self.analysis.extraction_budget_seconds();
        if self.analysis.enabled && self.server.webhook_timeout_seconds <= budget {
            return Err(ConfigError::invalid(
                "server.webhook_timeout_seconds",
                format!(
                    "Must exceed the extraction budget of {}s \
                     (extraction_timeout_seconds x (extraction_retries + 1)), got {}",
                    budget, self.server.webhook_timeout_seconds
                ),
            ));
        }

        let reconciler = &self.reconciler;
        if reconciler.max_push_attempts == 0 {
            return Err(ConfigError::invalid(
                "reconciler.max_push_attempts",
                "At least one push attempt is required",
            ));
        }

        if reconciler.initial_backoff_ms == 0 {
            return Err(ConfigError::invalid(
                "reconciler.initial_backoff_ms",
                "Backoff must be positive",
            ));
        }

        if reconciler.max_backoff_ms < reconciler.initial_backoff_ms {
            return Err(ConfigError::invalid(
                "reconciler.max_backoff_ms",
                format!(
                    "Must be >= initial_backoff_ms ({}), got {}",
                    reconciler.initial_backoff_ms, reconciler.max_backoff_ms
                ),
            ));
        }

        Ok(())
    }

    fn validate_persistence(&self) -> Result<(), ConfigError> {
        let persistence = &self.persistence;

        if persistence.backend == StoreBackend::Scylla {
            if persistence.scylla_hosts.is_empty() {
                return Err(ConfigError::invalid(
                    "persistence.scylla_hosts",
                    "At least one host is required for the scylla backend",
                ));
            }

            let valid_keyspace = !persistence.keyspace.is_empty()
                && persistence
                    .keyspace
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid_keyspace {
                return Err(ConfigError::invalid(
                    "persistence.keyspace",
                    format!("Invalid keyspace name {:?}", persistence.keyspace),
                ));
            }

            if persistence.replication_factor == 0 {
                return Err(ConfigError::invalid(
                    "persistence.replication_factor",
                    "Must be at least 1",
                ));
            }
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Path the platform posts events to
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,

    /// Public URL registered with the platform (informational)
    #[serde(default)]
    pub public_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Timeout of the webhook route; end-of-call reports are acknowledged
    /// only after extraction, so this must cover the whole extraction budget
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_webhook_path() -> String {
    "/webhook".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_webhook_timeout() -> u64 {
    180
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            webhook_path: default_webhook_path(),
            public_url: None,
            timeout_seconds: default_timeout(),
            webhook_timeout_seconds: default_webhook_timeout(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Webhook authentication
///
/// When `webhook_secret` is unset every request is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret (set via `WEBHOOK_SECRET` or `VOICE_WEBHOOK__AUTH__WEBHOOK_SECRET`)
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Header carrying the secret; `Authorization: Bearer` is also accepted
    #[serde(default = "default_secret_header")]
    pub header_name: String,
}

fn default_secret_header() -> String {
    "x-vapi-secret".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            header_name: default_secret_header(),
        }
    }
}

/// Voice platform REST API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_platform_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_platform_timeout")]
    pub timeout_seconds: u64,
}

fn default_platform_url() -> String {
    "https://api.vapi.ai".to_string()
}
fn default_platform_timeout() -> u64 {
    10
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_platform_url(),
            api_key: None,
            timeout_seconds: default_platform_timeout(),
        }
    }
}

/// LLM provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI-compatible chat completions (OpenAI, vLLM, Ollama /v1)
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    Claude,
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,

    #[serde(default = "default_model")]
    pub model: String,

    /// Overrides the provider's default endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,

    /// Transport-level retries (network errors, 5xx)
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_llm_timeout() -> u64 {
    30
}
fn default_llm_retries() -> u32 {
    2
}

impl LlmConfig {
    /// Endpoint to call, falling back to the provider default
    pub fn resolved_endpoint(&self) -> String {
        match (&self.endpoint, self.provider) {
            (Some(endpoint), _) => endpoint.trim_end_matches('/').to_string(),
            (None, LlmProvider::OpenAi) => "https://api.openai.com/v1".to_string(),
            (None, LlmProvider::Claude) => "https://api.anthropic.com".to_string(),
        }
    }

    /// Whether the endpoint is a hosted service that needs an API key
    pub fn is_remote(&self) -> bool {
        let endpoint = self.resolved_endpoint();
        !["://localhost", "://127.0.0.1", "://[::1]"]
            .iter()
            .any(|local| endpoint.contains(local))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_model(),
            endpoint: None,
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_llm_timeout(),
            max_retries: default_llm_retries(),
        }
    }
}

/// Function-call dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Timeout for tools that do not declare their own
    #[serde(default = "default_tool_timeout_ms")]
    pub default_timeout_ms: u64,
}

fn default_tool_timeout_ms() -> u64 {
    5000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_tool_timeout_ms(),
        }
    }
}

/// Transcript analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// When false, records are persisted without a transcript analysis
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Transcripts shorter than this skip extraction
    #[serde(default = "default_min_transcript_chars")]
    pub min_transcript_chars: usize,

    /// Corrective re-prompts after a schema-invalid response
    #[serde(default = "default_extraction_retries")]
    pub extraction_retries: u32,

    /// Budget for a single extraction attempt
    #[serde(default = "default_extraction_timeout")]
    pub extraction_timeout_seconds: u64,
}

fn default_min_transcript_chars() -> usize {
    50
}
fn default_extraction_retries() -> u32 {
    1
}
fn default_extraction_timeout() -> u64 {
    60
}

impl AnalysisConfig {
    /// Worst-case extraction time for one report, all attempts included
    pub fn extraction_budget_seconds(&self) -> u64 {
        self.extraction_timeout_seconds
            .saturating_mul(u64::from(self.extraction_retries) + 1)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_transcript_chars: default_min_transcript_chars(),
            extraction_retries: default_extraction_retries(),
            extraction_timeout_seconds: default_extraction_timeout(),
        }
    }
}

/// Push retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Total attempts per push, including the first
    #[serde(default = "default_max_push_attempts")]
    pub max_push_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Re-push `push_pending` records when the service starts
    #[serde(default = "default_true")]
    pub resume_on_startup: bool,

    /// Interval of the background recovery sweep; 0 disables it
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval_seconds: u64,
}

fn default_max_push_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    10_000
}
fn default_recovery_interval() -> u64 {
    300
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_push_attempts: default_max_push_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            resume_on_startup: true,
            recovery_interval_seconds: default_recovery_interval(),
        }
    }
}

/// Storage backend for analysis records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process only; records are lost on restart
    #[default]
    Memory,
    Scylla,
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,

    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

fn default_scylla_hosts() -> Vec<String> {
    vec!["127.0.0.1:9042".to_string()]
}

fn default_scylla_keyspace() -> String {
    "voice_webhook".to_string()
}

fn default_replication_factor() -> u8 {
    1
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// OTLP endpoint for traces (requires the `telemetry` feature)
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            otlp_endpoint: None,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (`VOICE_WEBHOOK__` prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
/// 4. Unprefixed deployment variables, for fields still unset
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Same as [`load_settings`] with an explicit config directory
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::from(dir.join("default")).required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::from(dir.join(env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let mut settings: Settings = config.try_deserialize()?;

    settings.apply_env_fallbacks(|key| std::env::var(key).ok())?;
    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.server.webhook_path, "/webhook");
        assert_eq!(settings.analysis.min_transcript_chars, 50);
        assert_eq!(settings.reconciler.max_push_attempts, 3);
        assert_eq!(settings.persistence.backend, StoreBackend::Memory);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_webhook_timeout_covers_extraction_budget() {
        let mut settings = Settings::default();
        assert_eq!(settings.analysis.extraction_budget_seconds(), 120);
        assert!(settings.server.webhook_timeout_seconds > 120);

        settings.server.webhook_timeout_seconds = 30;
        let err = settings.validate_pipeline().unwrap_err();
        assert!(err.to_string().contains("server.webhook_timeout_seconds"));

        settings.server.webhook_timeout_seconds = 120;
        assert!(settings.validate_pipeline().is_err());

        // Without extraction the webhook answers quickly
        settings.analysis.enabled = false;
        assert!(settings.validate_pipeline().is_ok());

        settings.analysis.enabled = true;
        settings.analysis.extraction_retries = 0;
        settings.analysis.extraction_timeout_seconds = 20;
        assert!(settings.validate_pipeline().is_ok());
    }

    #[test]
    fn test_server_validation() {
        let mut settings = Settings::default();

        settings.server.port = 0;
        assert!(settings.validate_server().is_err());
        settings.server.port = 8000;

        settings.server.timeout_seconds = 0;
        assert!(settings.validate_server().is_err());
        settings.server.timeout_seconds = 30;

        settings.server.webhook_path = "webhook".to_string();
        assert!(settings.validate_server().is_err());
        settings.server.webhook_path = "/webhook".to_string();

        assert!(settings.validate_server().is_ok());
    }

    #[test]
    fn test_backoff_validation() {
        let mut settings = Settings::default();

        settings.reconciler.max_push_attempts = 0;
        assert!(settings.validate_pipeline().is_err());
        settings.reconciler.max_push_attempts = 3;

        settings.reconciler.initial_backoff_ms = 2000;
        settings.reconciler.max_backoff_ms = 1000;
        assert!(settings.validate_pipeline().is_err());

        settings.reconciler.max_backoff_ms = 2000;
        assert!(settings.validate_pipeline().is_ok());
    }

    #[test]
    fn test_llm_validation() {
        let mut settings = Settings::default();

        settings.llm.temperature = 2.5;
        assert!(settings.validate_llm().is_err());
        settings.llm.temperature = 0.3;

        settings.llm.max_tokens = 0;
        assert!(settings.validate_llm().is_err());
        settings.llm.max_tokens = 500;

        assert!(settings.validate_llm().is_ok());
    }

    #[test]
    fn test_scylla_keyspace_validation() {
        let mut settings = Settings::default();
        settings.persistence.backend = StoreBackend::Scylla;
        settings.persistence.keyspace = "calls; DROP".to_string();
        assert!(settings.validate_persistence().is_err());

        settings.persistence.keyspace = "voice_webhook".to_string();
        assert!(settings.validate_persistence().is_ok());
    }

    #[test]
    fn test_require_credentials() {
        let mut settings = Settings::default();
        match settings.require_credentials() {
            Err(ConfigError::MissingField(field)) => assert_eq!(field, "platform.api_key"),
            other => panic!("expected missing platform key, got {:?}", other),
        }

        settings.platform.api_key = Some("vapi-key".to_string());
        match settings.require_credentials() {
            Err(ConfigError::MissingField(field)) => assert_eq!(field, "llm.api_key"),
            other => panic!("expected missing llm key, got {:?}", other),
        }

        // A local OpenAI-compatible endpoint does not need a key
        settings.llm.endpoint = Some("http://localhost:11434/v1".to_string());
        assert!(settings.require_credentials().is_ok());

        settings.llm.endpoint = None;
        settings.analysis.enabled = false;
        assert!(settings.require_credentials().is_ok());
    }

    #[test]
    fn test_env_fallbacks() {
        let mut settings = Settings::default();
        settings
            .apply_env_fallbacks(lookup_from(&[
                ("VAPI_API_KEY", "vapi"),
                ("OPENAI_API_KEY", "sk-test"),
                ("ANTHROPIC_API_KEY", "claude"),
                ("WEBHOOK_SECRET", "s3cret"),
                ("HOST", "127.0.0.1"),
                ("PORT", "9000"),
            ]))
            .unwrap();

        assert_eq!(settings.platform.api_key.as_deref(), Some("vapi"));
        assert_eq!(settings.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.auth.webhook_secret.as_deref(), Some("s3cret"));
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9000);
    }

    #[test]
    fn test_env_fallbacks_do_not_override() {
        let mut settings = Settings::default();
        settings.platform.api_key = Some("from-file".to_string());
        settings.server.port = 7000;

        settings
            .apply_env_fallbacks(lookup_from(&[
                ("VAPI_API_KEY", "vapi"),
                ("PORT", "9000"),
                ("VOICE_WEBHOOK__SERVER__PORT", "7000"),
            ]))
            .unwrap();

        assert_eq!(settings.platform.api_key.as_deref(), Some("from-file"));
        assert_eq!(settings.server.port, 7000);
    }

    #[test]
    fn test_env_fallback_bad_port() {
        let mut settings = Settings::default();
        let result = settings.apply_env_fallbacks(lookup_from(&[("PORT", "eighty")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.yaml"),
            "server:\n  port: 8100\nllm:\n  provider: claude\n  model: claude-3-5-sonnet-latest\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("staging.yaml"),
            "environment: staging\nreconciler:\n  max_push_attempts: 5\n",
        )
        .unwrap();

        let settings = load_settings_from(dir.path(), Some("staging")).unwrap();
        assert_eq!(settings.environment, RuntimeEnvironment::Staging);
        assert_eq!(settings.llm.provider, LlmProvider::Claude);
        assert_eq!(settings.llm.resolved_endpoint(), "https://api.anthropic.com");
        assert_eq!(settings.reconciler.max_push_attempts, 5);
        assert_eq!(settings.analysis.min_transcript_chars, 50);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.yaml"), "reconciler:\n  max_push_attempts: 0\n")
            .unwrap();
        assert!(load_settings_from(dir.path(), None).is_err());
    }
}
