//! LLM backend trait and the OpenAI-compatible implementation
//!
//! Every backend runs a bounded retry loop with exponential backoff for
//! transient failures (network errors, timeouts, 5xx and 429). Client errors
//! are returned immediately.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};

use crate::prompt::Message;
use crate::LlmError;

/// Connection and sampling settings shared by all backends
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Model name/ID
    pub model: String,
    /// API base URL, without the trailing path
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    pub temperature: f32,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retry attempts for transient failures
    pub max_retries: u32,
    /// Initial backoff duration (doubles each retry)
    pub initial_backoff: Duration,
    /// Ask the provider to constrain output to a JSON object
    pub json_mode: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: None,
            max_tokens: 1000,
            temperature: 0.1,
            timeout: Duration::from_secs(30),
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            json_mode: true,
        }
    }
}

impl From<&voice_webhook_config::LlmConfig> for BackendConfig {
    fn from(config: &voice_webhook_config::LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            endpoint: config.resolved_endpoint(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_seconds),
            max_retries: config.max_retries,
            ..Default::default()
        }
    }
}

/// LLM generation result
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Generated text
    pub text: String,
    /// Tokens generated
    pub tokens: usize,
    /// Total generation time (ms), retries included
    pub total_time_ms: u64,
    pub finish_reason: FinishReason,
}

/// Finish reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
}

/// LLM Backend trait
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generate a complete (non-streaming) response
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Run `op` with exponential backoff while it fails with a retryable error
pub(crate) async fn with_retries<T, F, Fut>(config: &BackendConfig, mut op: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut last_error = None;
    let mut backoff = config.initial_backoff;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            tracing::warn!(
                "LLM request failed, retrying in {:?} (attempt {}/{})",
                backoff,
                attempt,
                config.max_retries
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => last_error = Some(e),
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| LlmError::Network("Max retries exceeded".to_string())))
}

/// Map a non-success HTTP status to an error; 5xx and 429 are retryable
pub(crate) async fn check_status(response: Response) -> Result<Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() || status.as_u16() == 429 {
        return Err(LlmError::Network(format!("Server error {}: {}", status, body)));
    }
    Err(LlmError::Api(format!("HTTP {}: {}", status, body)))
}

/// OpenAI-compatible backend
///
/// Works with:
/// - OpenAI (GPT-4o and friends)
/// - vLLM
/// - Ollama's `/v1` endpoint and other local OpenAI-compatible servers
pub struct OpenAIBackend {
    config: BackendConfig,
    client: Client,
}

impl OpenAIBackend {
    pub fn new(config: BackendConfig) -> Result<Self, LlmError> {
        let is_local = config.endpoint.starts_with("http://localhost")
            || config.endpoint.starts_with("http://127.0.0.1");
        if config.api_key.as_deref().map_or(true, str::is_empty) && !is_local {
            return Err(LlmError::Configuration(
                "API key required for remote endpoints".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    async fn execute_request(&self, request: &OpenAIChatRequest) -> Result<OpenAIChatResponse, LlmError> {
        let mut builder = self.client.post(self.chat_url()).json(request);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.bearer_auth(key);
        }

        let response = check_status(builder.send().await?).await?;
        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl LlmBackend for OpenAIBackend {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        let start = Instant::now();

        let request = OpenAIChatRequest {
            model: self.config.model.clone(),
            messages: messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            response_format: self.config.json_mode.then(|| ResponseFormat {
                kind: "json_object".to_string(),
            }),
        };

        let response = with_retries(&self.config, || self.execute_request(&request)).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        Ok(GenerationResult {
            text: choice.message.content.unwrap_or_default(),
            tokens: response.usage.map(|u| u.completion_tokens).unwrap_or(0),
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: match choice.finish_reason.as_deref() {
                Some("length") => FinishReason::Length,
                Some("content_filter") => FinishReason::ContentFilter,
                _ => FinishReason::Stop,
            },
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    completion_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Role;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> BackendConfig {
        BackendConfig {
            endpoint: format!("{}/v1", server.uri()),
            api_key: Some("sk-test".to_string()),
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "choices": [{ "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }],
            "usage": { "completion_tokens": 12, "prompt_tokens": 100, "total_tokens": 112 }
        })
    }

    #[test]
    fn test_remote_endpoint_requires_key() {
        let config = BackendConfig::default();
        assert!(matches!(
            OpenAIBackend::new(config),
            Err(LlmError::Configuration(_))
        ));

        let local = BackendConfig {
            endpoint: "http://localhost:11434/v1".to_string(),
            ..Default::default()
        };
        assert!(OpenAIBackend::new(local).is_ok());
    }

    #[test]
    fn test_request_serialization() {
        let request = OpenAIChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![OpenAIMessage {
                role: Role::System.to_string(),
                content: "x".to_string(),
            }],
            max_tokens: Some(10),
            temperature: None,
            response_format: Some(ResponseFormat {
                kind: "json_object".to_string(),
            }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert!(json.get("temperature").is_none());
    }

    #[tokio::test]
    async fn test_generate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("{\"a\":1}")))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(config_for(&server)).unwrap();
        let result = backend.generate(&[Message::user("hi")]).await.unwrap();
        assert_eq!(result.text, "{\"a\":1}");
        assert_eq!(result.tokens, 12);
        assert_eq!(result.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(config_for(&server)).unwrap();
        let result = backend.generate(&[Message::user("hi")]).await.unwrap();
        assert_eq!(result.text, "ok");
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(config_for(&server)).unwrap();
        let err = backend.generate(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::Api(_)));
    }
}
