//! Claude (Anthropic Messages API) backend

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::backend::{check_status, with_retries, BackendConfig, FinishReason, GenerationResult, LlmBackend};
use crate::prompt::{system_prompt, Message, Role};
use crate::LlmError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Claude backend
pub struct ClaudeBackend {
    config: BackendConfig,
    client: Client,
}

impl ClaudeBackend {
    pub fn new(config: BackendConfig) -> Result<Self, LlmError> {
        if config.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(LlmError::Configuration(
                "ANTHROPIC_API_KEY not set. Set it via environment or config.".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.endpoint.trim_end_matches('/'))
    }

    /// Convert messages to Claude format; system messages travel separately
    fn convert_messages(messages: &[Message]) -> Vec<ClaudeMessage> {
        messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| ClaudeMessage {
                role: m.role.to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    async fn execute_request(&self, request: &ClaudeRequest) -> Result<ClaudeApiResponse, LlmError> {
        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", self.config.api_key.as_deref().unwrap_or_default())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl LlmBackend for ClaudeBackend {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        let start = Instant::now();

        let request = ClaudeRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: Self::convert_messages(messages),
            system: system_prompt(messages),
            temperature: Some(self.config.temperature.clamp(0.0, 1.0)),
        };

        let response = with_retries(&self.config, || self.execute_request(&request)).await?;

        let text: String = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ClaudeContentBlock::Text { text } => Some(text),
                ClaudeContentBlock::Other => None,
            })
            .collect();

        Ok(GenerationResult {
            text,
            tokens: response.usage.output_tokens,
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: match response.stop_reason.as_deref() {
                Some("max_tokens") => FinishReason::Length,
                _ => FinishReason::Stop,
            },
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// =============================================================================
// Claude API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ClaudeApiResponse {
    content: Vec<ClaudeContentBlock>,
    stop_reason: Option<String>,
    usage: ClaudeUsage,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    output_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_requires_api_key() {
        assert!(ClaudeBackend::new(BackendConfig::default()).is_err());
    }

    #[test]
    fn test_convert_messages_drops_system() {
        let converted = ClaudeBackend::convert_messages(&[
            Message::system("rules"),
            Message::user("transcript"),
        ]);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].role, "user");
    }

    #[tokio::test]
    async fn test_generate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "claude-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    { "type": "text", "text": "{\"summary\":" },
                    { "type": "text", "text": "\"ok\"}" }
                ],
                "stop_reason": "end_turn",
                "usage": { "input_tokens": 50, "output_tokens": 7 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = ClaudeBackend::new(BackendConfig {
            model: "claude-3-5-sonnet-latest".to_string(),
            endpoint: server.uri(),
            api_key: Some("claude-key".to_string()),
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        })
        .unwrap();

        let result = backend
            .generate(&[Message::system("rules"), Message::user("hi")])
            .await
            .unwrap();
        assert_eq!(result.text, "{\"summary\":\"ok\"}");
        assert_eq!(result.tokens, 7);
    }
}
