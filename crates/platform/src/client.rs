//! Platform client trait and the Vapi REST implementation

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde_json::json;
use std::time::Duration;
use voice_webhook_config::PlatformConfig;
use voice_webhook_core::CallAnalysisResult;

use crate::calls::CallSummary;
use crate::projection::format_analysis_for_platform;
use crate::PlatformError;

/// Outbound operations against the orchestration platform
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Attach the analysis projection to the call record
    async fn push_analysis(&self, call_id: &str, result: &CallAnalysisResult) -> Result<(), PlatformError>;

    async fn get_call(&self, call_id: &str) -> Result<CallSummary, PlatformError>;

    /// Most recent calls first, at most `limit`
    async fn list_calls(&self, limit: usize) -> Result<Vec<CallSummary>, PlatformError>;
}

/// Vapi REST client
pub struct VapiClient {
    base_url: Url,
    api_key: String,
    client: Client,
}

impl VapiClient {
    pub fn new(config: &PlatformConfig) -> Result<Self, PlatformError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PlatformError::Configuration("platform API key is not set".to_string()))?;

        Self::with_timeout(&config.base_url, api_key, Duration::from_secs(config.timeout_seconds))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::Configuration(e.to_string()))?;

        let base_url = base_url.into();
        let base_url = Url::parse(&base_url).map_err(|e| {
            PlatformError::Configuration(format!("invalid platform base URL {:?}: {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(PlatformError::Configuration(format!(
                "platform base URL cannot take a path: {}",
                base_url
            )));
        }

        Ok(Self {
            base_url,
            api_key: api_key.into(),
            client,
        })
    }

    /// `{base}/call[/{call_id}]`, with the id percent-encoded as one path segment
    fn call_url(&self, call_id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("call");
            if let Some(id) = call_id {
                segments.push(id);
            }
        }
        url
    }

    fn check_call_id(call_id: &str) -> Result<(), PlatformError> {
        let invalid = call_id.is_empty()
            || call_id == "unknown"
            || call_id.contains('/')
            || call_id.chars().any(|c| c.is_whitespace() || c.is_control());
        if invalid {
            return Err(PlatformError::InvalidCallId(call_id.to_string()));
        }
        Ok(())
    }

    async fn check_status(response: Response) -> Result<Response, PlatformError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PlatformError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PlatformClient for VapiClient {
    async fn push_analysis(&self, call_id: &str, result: &CallAnalysisResult) -> Result<(), PlatformError> {
        Self::check_call_id(call_id)?;

        let payload = json!({ "metadata": format_analysis_for_platform(result) });
        let response = self
            .client
            .patch(self.call_url(Some(call_id)))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        Self::check_status(response).await?;

        tracing::info!(call_id = %call_id, "Updated platform call with analysis metadata");
        Ok(())
    }

    async fn get_call(&self, call_id: &str) -> Result<CallSummary, PlatformError> {
        Self::check_call_id(call_id)?;

        let response = self
            .client
            .get(self.call_url(Some(call_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))
    }

    async fn list_calls(&self, limit: usize) -> Result<Vec<CallSummary>, PlatformError> {
        let response = self
            .client
            .get(self.call_url(None))
            .bearer_auth(&self.api_key)
            .query(&[("limit", limit)])
            .send()
            .await?;
        Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_webhook_core::CallMetrics;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> VapiClient {
        VapiClient::with_timeout(server.uri(), "test-key", Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_new_requires_api_key() {
        let config = PlatformConfig {
            api_key: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(matches!(VapiClient::new(&config), Err(PlatformError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_push_analysis_patches_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/call/c1"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"metadata": {"analysis_version": "1.0"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "c1"})))
            .expect(1)
            .mount(&server)
            .await;

        let result = CallAnalysisResult::new(CallMetrics::new("c1"), None);
        client(&server).push_analysis("c1", &result).await.unwrap();
    }

    #[tokio::test]
    async fn test_push_analysis_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let result = CallAnalysisResult::new(CallMetrics::new("c1"), None);
        let err = client(&server).push_analysis("c1", &result).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_push_rejects_placeholder_call_id() {
        let server = MockServer::start().await;
        let result = CallAnalysisResult::new(CallMetrics::new("unknown"), None);
        let err = client(&server).push_analysis("unknown", &result).await.unwrap_err();
        assert!(matches!(err, PlatformError::InvalidCallId(_)));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_call_id_stays_in_its_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/call/abc%3Flimit=1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "abc?limit=1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/call/c%231"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let call = client.get_call("abc?limit=1").await.unwrap();
        assert_eq!(call.id, "abc?limit=1");

        let result = CallAnalysisResult::new(CallMetrics::new("c#1"), None);
        client.push_analysis("c#1", &result).await.unwrap();
    }

    #[tokio::test]
    async fn test_whitespace_call_ids_rejected() {
        let server = MockServer::start().await;
        let client = client(&server);
        for id in ["c 1", " c1", "c1\n", "c1\t"] {
            let err = client.get_call(id).await.unwrap_err();
            assert!(matches!(err, PlatformError::InvalidCallId(_)), "{:?}", id);
        }
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[test]
    fn test_base_url_with_path_prefix() {
        let client =
            VapiClient::with_timeout("https://gateway.example.com/vapi/", "k", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.call_url(Some("c1")).as_str(),
            "https://gateway.example.com/vapi/call/c1"
        );
        assert_eq!(client.call_url(None).as_str(), "https://gateway.example.com/vapi/call");
        assert!(VapiClient::with_timeout("not a url", "k", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_list_and_get_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/call"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "a", "status": "ended", "cost": 0.1},
                {"id": "b", "status": "in-progress"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/call/a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "a", "status": "ended", "duration": 61.0, "transcript": "AI: Hi"
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let calls = client.list_calls(2).await.unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].status.as_deref(), Some("in-progress"));

        let call = client.get_call("a").await.unwrap();
        assert_eq!(call.duration_seconds(), Some(61.0));
        assert_eq!(call.transcript.as_deref(), Some("AI: Hi"));
    }

    #[tokio::test]
    async fn test_get_call_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/call/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;

        let err = client(&server).get_call("missing").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_retryable());
    }
}
