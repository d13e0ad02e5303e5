//! Call analysis data model
//!
//! Types produced for a finished call: metrics derived from the end-of-call
//! report, the structured transcript analysis, and the aggregate record that
//! is persisted and forwarded to the platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who spoke a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The voice assistant
    Assistant,
    /// The customer on the line
    User,
    /// System or tool messages interleaved by the platform
    System,
}

impl Speaker {
    /// Map a platform role string; anything that is not a known party is `System`
    pub fn from_role(role: &str) -> Self {
        match role.to_ascii_lowercase().as_str() {
            "assistant" | "bot" | "agent" => Speaker::Assistant,
            "user" | "customer" | "human" => Speaker::User,
            _ => Speaker::System,
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Assistant => write!(f, "assistant"),
            Speaker::User => write!(f, "user"),
            Speaker::System => write!(f, "system"),
        }
    }
}

/// One line of a call transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    /// Seconds from call start, when the platform provides it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl TranscriptEntry {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp: None,
        }
    }

    pub fn at(mut self, seconds: f64) -> Self {
        self.timestamp = Some(seconds);
        self
    }
}

/// Render a transcript as `speaker: text` lines for prompting
pub fn render_transcript(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .filter(|e| e.speaker != Speaker::System)
        .map(|e| format!("{}: {}", e.speaker, e.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Basic call metrics from the end-of-call report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMetrics {
    pub call_id: String,
    #[serde(default)]
    pub duration_seconds: f64,
    /// Call cost in USD
    #[serde(default)]
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl CallMetrics {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            duration_seconds: 0.0,
            cost: 0.0,
            ended_reason: None,
            started_at: None,
            ended_at: None,
        }
    }
}

/// Whether the customer agreed to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Converted,
    Interested,
    NotInterested,
    #[default]
    Unknown,
}

impl ConversionStatus {
    pub const ALL: [&'static str; 4] = ["converted", "interested", "not_interested", "unknown"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Converted => "converted",
            Self::Interested => "interested",
            Self::NotInterested => "not_interested",
            Self::Unknown => "unknown",
        }
    }
}

/// Overall customer satisfaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SatisfactionLevel {
    VerySatisfied,
    Satisfied,
    Neutral,
    Dissatisfied,
    VeryDissatisfied,
}

impl SatisfactionLevel {
    pub const ALL: [&'static str; 5] = [
        "very_satisfied",
        "satisfied",
        "neutral",
        "dissatisfied",
        "very_dissatisfied",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VerySatisfied => "very_satisfied",
            Self::Satisfied => "satisfied",
            Self::Neutral => "neutral",
            Self::Dissatisfied => "dissatisfied",
            Self::VeryDissatisfied => "very_dissatisfied",
        }
    }
}

/// Eligibility result discussed during the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityOutcome {
    Eligible,
    ReviewRequired,
    NotEligible,
    NotChecked,
}

impl EligibilityOutcome {
    pub const ALL: [&'static str; 4] = ["eligible", "review_required", "not_eligible", "not_checked"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::ReviewRequired => "review_required",
            Self::NotEligible => "not_eligible",
            Self::NotChecked => "not_checked",
        }
    }

    pub fn was_checked(&self) -> bool {
        !matches!(self, Self::NotChecked)
    }
}

/// Inclusive bounds of `satisfaction_score`
pub const SATISFACTION_SCORE_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

/// Structured analysis extracted from a call transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptAnalysis {
    pub conversion_status: ConversionStatus,
    /// Confidence of `conversion_status`, always within `0.0..=1.0`
    #[serde(default)]
    pub conversion_confidence: f64,
    #[serde(default)]
    pub satisfaction_level: Option<SatisfactionLevel>,
    /// 1 (very dissatisfied) to 5 (very satisfied)
    #[serde(default)]
    pub satisfaction_score: Option<u8>,
    #[serde(default)]
    pub satisfaction_reasoning: String,
    /// Objections in the order the customer raised them
    #[serde(default, alias = "key_objections")]
    pub objections: Vec<String>,
    #[serde(default)]
    pub positive_signals: Vec<String>,
    #[serde(default)]
    pub eligibility_outcome: Option<EligibilityOutcome>,
    /// Annual income the customer stated for the eligibility check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_income: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_existing_credit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_detected: Option<String>,
    pub summary: String,
}

/// Delivery state of a record towards the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushState {
    /// Persisted locally, not yet accepted by the platform
    PushPending,
    /// Accepted by the platform
    Pushed,
    /// Retry budget exhausted; needs manual intervention
    PushFailed,
}

impl PushState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PushPending => "push_pending",
            Self::Pushed => "pushed",
            Self::PushFailed => "push_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "push_pending" => Some(Self::PushPending),
            "pushed" => Some(Self::Pushed),
            "push_failed" => Some(Self::PushFailed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::PushPending)
    }
}

impl fmt::Display for PushState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate persisted and forwarded for one call
///
/// Created once when the end-of-call report is processed and never mutated
/// afterwards; only the surrounding store record tracks push progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAnalysisResult {
    pub call_id: String,
    pub call_metrics: CallMetrics,
    /// `None` when extraction was skipped or failed
    pub transcript_analysis: Option<TranscriptAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
    /// Timestamp of the event that produced this record, when provided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_timestamp: Option<DateTime<Utc>>,
    pub analyzed_at: DateTime<Utc>,
}

impl CallAnalysisResult {
    pub fn new(metrics: CallMetrics, analysis: Option<TranscriptAnalysis>) -> Self {
        Self {
            call_id: metrics.call_id.clone(),
            call_metrics: metrics,
            transcript_analysis: analysis,
            analysis_error: None,
            event_timestamp: None,
            analyzed_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.analysis_error = Some(error.into());
        self
    }

    pub fn with_event_timestamp(mut self, ts: Option<DateTime<Utc>>) -> Self {
        self.event_timestamp = ts;
        self
    }

    pub fn has_analysis(&self) -> bool {
        self.transcript_analysis.is_some()
    }
}
