//! Transcript analyzer
//!
//! One extraction per call: render the transcript, ask the model for a JSON
//! object, validate it against the analysis schema. A rejected answer gets a
//! bounded number of corrective follow-ups before the call is given up on.

use std::sync::Arc;
use std::time::{Duration, Instant};
use voice_webhook_config::AnalysisConfig;
use voice_webhook_core::{render_transcript, EndOfCallReport, PipelineError, TranscriptAnalysis};
use voice_webhook_llm::{LlmBackend, Message};

use crate::extraction::{build_prompt, corrective_prompt, AnalysisValidator, SYSTEM_PROMPT};
use crate::AnalysisError;

/// Recorded as `analysis_error` when extraction is skipped for length
pub const TRANSCRIPT_TOO_SHORT: &str = "transcript too short";

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Rendered transcripts shorter than this are not sent to the model
    pub min_transcript_chars: usize,
    /// Corrective follow-ups after a rejected answer
    pub extraction_retries: u32,
    /// Budget for a single model request
    pub timeout: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_transcript_chars: 50,
            extraction_retries: 1,
            timeout: Duration::from_secs(60),
        }
    }
}

impl From<&AnalysisConfig> for AnalyzerConfig {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            min_transcript_chars: config.min_transcript_chars,
            extraction_retries: config.extraction_retries,
            timeout: Duration::from_secs(config.extraction_timeout_seconds),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Completed(TranscriptAnalysis),
    /// Extraction was not attempted
    Skipped(String),
}

pub struct TranscriptAnalyzer {
    backend: Arc<dyn LlmBackend>,
    validator: AnalysisValidator,
    config: AnalyzerConfig,
}

impl TranscriptAnalyzer {
    pub fn new(backend: Arc<dyn LlmBackend>, config: AnalyzerConfig) -> Result<Self, AnalysisError> {
        Ok(Self {
            backend,
            validator: AnalysisValidator::new()?,
            config,
        })
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Extract a structured analysis from a finished call
    pub async fn analyze(
        &self,
        call_id: &str,
        report: &EndOfCallReport,
    ) -> Result<AnalysisOutcome, PipelineError> {
        let transcript = render_transcript(&report.transcript);
        if transcript.trim().chars().count() < self.config.min_transcript_chars {
            tracing::info!(
                call_id = %call_id,
                chars = transcript.trim().chars().count(),
                "Transcript too short for analysis"
            );
            metrics::counter!("analysis_extractions_total", "outcome" => "skipped").increment(1);
            return Ok(AnalysisOutcome::Skipped(TRANSCRIPT_TOO_SHORT.to_string()));
        }

        let start = Instant::now();
        let max_attempts = self.config.extraction_retries + 1;
        let mut messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(build_prompt(
                &transcript,
                &report.metrics,
                report.platform_summary.as_deref(),
            )),
        ];
        let mut reason = String::new();

        for attempt in 1..=max_attempts {
            let generated = match tokio::time::timeout(self.config.timeout, self.backend.generate(&messages)).await
            {
                Ok(Ok(generated)) => generated,
                Ok(Err(e)) => {
                    tracing::warn!(call_id = %call_id, attempt, error = %e, "Extraction request failed");
                    reason = format!("model request failed: {}", e);
                    continue;
                },
                Err(_) => {
                    tracing::warn!(call_id = %call_id, attempt, timeout = ?self.config.timeout, "Extraction request timed out");
                    reason = format!("model request timed out after {:?}", self.config.timeout);
                    continue;
                },
            };

            match self.validator.parse(&generated.text) {
                Ok(analysis) => {
                    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                    metrics::histogram!("analysis_latency_ms").record(elapsed_ms);
                    metrics::counter!("analysis_extractions_total", "outcome" => "completed").increment(1);
                    tracing::info!(
                        call_id = %call_id,
                        attempt,
                        conversion = analysis.conversion_status.as_str(),
                        elapsed_ms,
                        "Transcript analyzed"
                    );
                    return Ok(AnalysisOutcome::Completed(analysis));
                },
                Err(errors) => {
                    tracing::warn!(
                        call_id = %call_id,
                        attempt,
                        errors = ?errors,
                        "Extraction output failed validation"
                    );
                    reason = errors.join("; ");
                    messages.push(Message::assistant(generated.text));
                    messages.push(Message::user(corrective_prompt(&errors)));
                },
            }
        }

        metrics::counter!("analysis_extractions_total", "outcome" => "failed").increment(1);
        Err(PipelineError::AnalysisExtractionFailed {
            call_id: call_id.to_string(),
            attempts: max_attempts,
            reason,
        })
    }
}
