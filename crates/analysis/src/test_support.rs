//! Scripted fakes for the LLM backend and the platform client

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use voice_webhook_core::{CallAnalysisResult, CallMetrics, EndOfCallReport, Speaker, TranscriptEntry};
use voice_webhook_llm::{FinishReason, GenerationResult, LlmBackend, LlmError, Message};
use voice_webhook_platform::{CallSummary, PlatformClient, PlatformError};

pub(crate) const VALID_ANALYSIS: &str = r#"{
    "conversion_status": "converted",
    "conversion_confidence": 0.92,
    "satisfaction_level": "very_satisfied",
    "satisfaction_score": 5,
    "satisfaction_reasoning": "Thanked the agent twice",
    "objections": [],
    "positive_signals": ["asked how soon the card arrives"],
    "eligibility_outcome": "eligible",
    "language_detected": "en",
    "summary": "Customer qualified and agreed to apply."
}"#;

/// Replays scripted responses; the last one repeats once the script runs out
pub(crate) struct FakeLlm {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    last: Mutex<Option<String>>,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl FakeLlm {
    pub fn new(script: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LlmBackend for FakeLlm {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(messages.to_vec());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.script.lock().pop_front();
        let text = match next {
            Some(Ok(text)) => {
                *self.last.lock() = Some(text.clone());
                text
            },
            Some(Err(e)) => return Err(e),
            None => self
                .last
                .lock()
                .clone()
                .ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string()))?,
        };

        Ok(GenerationResult {
            tokens: text.len() / 4,
            text,
            total_time_ms: 1,
            finish_reason: FinishReason::Stop,
        })
    }

    fn model_name(&self) -> &str {
        "fake"
    }
}

/// Fails the first `failures` pushes with the given status, then succeeds
pub(crate) struct FakePlatform {
    failures: AtomicUsize,
    status: u16,
    pushes: AtomicUsize,
    pushed: Mutex<Vec<String>>,
}

impl FakePlatform {
    pub fn ok() -> Self {
        Self::failing(0, 503)
    }

    pub fn failing(failures: usize, status: u16) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            status,
            pushes: AtomicUsize::new(0),
            pushed: Mutex::new(Vec::new()),
        }
    }

    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    pub fn pushed_ids(&self) -> Vec<String> {
        self.pushed.lock().clone()
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn push_analysis(&self, call_id: &str, _result: &CallAnalysisResult) -> Result<(), PlatformError> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(PlatformError::Api {
                status: self.status,
                body: "scripted failure".to_string(),
            });
        }
        self.pushed.lock().push(call_id.to_string());
        Ok(())
    }

    async fn get_call(&self, call_id: &str) -> Result<CallSummary, PlatformError> {
        Err(PlatformError::Api {
            status: 404,
            body: format!("no call {}", call_id),
        })
    }

    async fn list_calls(&self, _limit: usize) -> Result<Vec<CallSummary>, PlatformError> {
        Ok(Vec::new())
    }
}

pub(crate) fn report(call_id: &str) -> EndOfCallReport {
    let mut metrics = CallMetrics::new(call_id);
    metrics.duration_seconds = 120.0;
    metrics.cost = 0.12;
    EndOfCallReport {
        metrics,
        transcript: vec![
            TranscriptEntry::new(
                Speaker::Assistant,
                "Hi, this is Andrew from Bull Bank. Could I tell you about our new credit card?",
            ),
            TranscriptEntry::new(Speaker::User, "Sure. I earn about thirty thousand a year."),
            TranscriptEntry::new(Speaker::Assistant, "Great news, you qualify. Shall I start the application?"),
            TranscriptEntry::new(Speaker::User, "Yes please, thank you!"),
        ],
        platform_summary: None,
    }
}
