//! Event Classifier
//!
//! Turns the loosely structured JSON the platform posts to the webhook into a
//! strongly typed [`EventEnvelope`]. Every recognized kind validates its
//! required fields here, so downstream handlers never probe raw JSON.
//!
//! The platform wraps every notification as `{"message": {"type": ..., "call": {"id": ...}, ...}}`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::call::{CallMetrics, Speaker, TranscriptEntry};
use crate::error::PipelineError;

/// Kinds of events this service acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    FunctionCall,
    EndOfCallReport,
    /// Wire name is `transcript`
    #[serde(rename = "transcript")]
    TranscriptUpdate,
    StatusUpdate,
    Hang,
}

impl EventKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function-call" => Some(Self::FunctionCall),
            "end-of-call-report" => Some(Self::EndOfCallReport),
            "transcript" | "transcript-update" => Some(Self::TranscriptUpdate),
            "status-update" => Some(Self::StatusUpdate),
            "hang" => Some(Self::Hang),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FunctionCall => "function-call",
            Self::EndOfCallReport => "end-of-call-report",
            Self::TranscriptUpdate => "transcript",
            Self::StatusUpdate => "status-update",
            Self::Hang => "hang",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified, validated event
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    /// Correlation key across all processing
    pub call_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub payload: EventPayload,
}

impl EventEnvelope {
    pub fn kind(&self) -> EventKind {
        match &self.payload {
            EventPayload::FunctionCall(_) => EventKind::FunctionCall,
            EventPayload::EndOfCallReport(_) => EventKind::EndOfCallReport,
            EventPayload::TranscriptUpdate(_) => EventKind::TranscriptUpdate,
            EventPayload::StatusUpdate(_) => EventKind::StatusUpdate,
            EventPayload::Hang => EventKind::Hang,
        }
    }
}

/// Kind-specific payloads
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    FunctionCall(FunctionCallRequest),
    EndOfCallReport(EndOfCallReport),
    TranscriptUpdate(TranscriptUpdate),
    StatusUpdate(StatusUpdate),
    Hang,
}

/// A tool invocation issued mid-conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallRequest {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

/// Failure details returned to the conversation in place of a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: String,
    pub message: String,
}

/// Synchronous answer to a [`FunctionCallRequest`]
///
/// Serializes as `{"tool_name", "result"}` on success. Failures carry an
/// `error` object and, when the conversation needs something to say, a
/// spoken fallback in `result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallResult {
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
}

impl FunctionCallResult {
    pub fn ok(tool_name: impl Into<String>, result: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(tool_name: impl Into<String>, err: &PipelineError) -> Self {
        Self {
            tool_name: tool_name.into(),
            result: None,
            error: Some(ToolFailure {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }),
        }
    }

    /// Attach something the assistant can say instead of the missing result
    pub fn with_fallback(mut self, spoken: impl Into<String>) -> Self {
        self.result = Some(Value::String(spoken.into()));
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Finished-call report
#[derive(Debug, Clone, PartialEq)]
pub struct EndOfCallReport {
    pub metrics: CallMetrics,
    pub transcript: Vec<TranscriptEntry>,
    /// Platform-side summary, if the platform produced one
    pub platform_summary: Option<String>,
}

/// Live transcript fragment
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptUpdate {
    pub speaker: Speaker,
    pub text: String,
    pub is_final: bool,
}

/// Call status change
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: String,
    pub ended_reason: Option<String>,
}

// Raw wire shapes. Everything is optional here; required-ness is enforced in
// `classify` so that errors name the missing field.

#[derive(Debug, Deserialize)]
struct RawCall {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFunctionCallEvent {
    #[serde(rename = "functionCall")]
    function_call: Option<RawFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct RawFunctionCall {
    name: Option<String>,
    #[serde(default)]
    parameters: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEndOfCall {
    duration_seconds: Option<f64>,
    cost: Option<f64>,
    ended_reason: Option<String>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    transcript: Option<String>,
    messages: Option<Vec<RawTranscriptLine>>,
    artifact: Option<RawArtifact>,
    summary: Option<String>,
    analysis: Option<RawPlatformAnalysis>,
}

#[derive(Debug, Default, Deserialize)]
struct RawArtifact {
    messages: Option<Vec<RawTranscriptLine>>,
    transcript: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPlatformAnalysis {
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTranscriptLine {
    /// Tool results and some system entries carry no role
    #[serde(default)]
    role: Option<String>,
    message: Option<String>,
    content: Option<String>,
    seconds_from_start: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTranscriptEvent {
    role: Option<String>,
    transcript: Option<String>,
    transcript_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatusEvent {
    status: Option<String>,
    ended_reason: Option<String>,
}

/// Classify raw webhook bytes
pub fn classify_bytes(body: &[u8]) -> Result<EventEnvelope, PipelineError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| PipelineError::malformed("envelope", format!("invalid JSON: {}", e)))?;
    classify(&value)
}

/// Classify a parsed webhook body
///
/// Fails with `UnrecognizedEventKind` for kinds this service does not handle
/// and `MalformedEventPayload` when a recognized kind lacks required fields.
pub fn classify(raw: &Value) -> Result<EventEnvelope, PipelineError> {
    let message = raw
        .get("message")
        .and_then(Value::as_object)
        .ok_or_else(|| PipelineError::malformed("envelope", "missing `message` object"))?;

    let kind_str = message
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::malformed("envelope", "missing `message.type`"))?;

    let kind = EventKind::parse(kind_str)
        .ok_or_else(|| PipelineError::UnrecognizedEventKind(kind_str.to_string()))?;

    let call: Option<RawCall> = match message.get("call") {
        Some(v) => Some(decode(kind, v.clone())?),
        None => None,
    };
    let call_id = call
        .and_then(|c| c.id)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| PipelineError::malformed(kind.as_str(), "missing `call.id`"))?;

    let timestamp = message.get("timestamp").and_then(parse_timestamp);
    let body = Value::Object(message.clone());

    let payload = match kind {
        EventKind::FunctionCall => {
            EventPayload::FunctionCall(parse_function_call(&call_id, decode(kind, body)?)?)
        },
        EventKind::EndOfCallReport => {
            EventPayload::EndOfCallReport(parse_end_of_call(&call_id, decode(kind, body)?)?)
        },
        EventKind::TranscriptUpdate => {
            let raw: RawTranscriptEvent = decode(kind, body)?;
            let role = raw
                .role
                .ok_or_else(|| PipelineError::malformed(kind.as_str(), "missing `role`"))?;
            let text = raw
                .transcript
                .ok_or_else(|| PipelineError::malformed(kind.as_str(), "missing `transcript`"))?;
            EventPayload::TranscriptUpdate(TranscriptUpdate {
                speaker: Speaker::from_role(&role),
                text,
                is_final: raw.transcript_type.as_deref() != Some("partial"),
            })
        },
        EventKind::StatusUpdate => {
            let raw: RawStatusEvent = decode(kind, body)?;
            let status = raw
                .status
                .ok_or_else(|| PipelineError::malformed(kind.as_str(), "missing `status`"))?;
            EventPayload::StatusUpdate(StatusUpdate {
                status,
                ended_reason: raw.ended_reason,
            })
        },
        EventKind::Hang => EventPayload::Hang,
    };

    Ok(EventEnvelope {
        call_id,
        timestamp,
        payload,
    })
}

fn decode<T: DeserializeOwned>(kind: EventKind, value: Value) -> Result<T, PipelineError> {
    serde_json::from_value(value).map_err(|e| PipelineError::malformed(kind.as_str(), e.to_string()))
}

fn parse_function_call(
    call_id: &str,
    raw: RawFunctionCallEvent,
) -> Result<FunctionCallRequest, PipelineError> {
    let kind = EventKind::FunctionCall.as_str();
    let call = raw
        .function_call
        .ok_or_else(|| PipelineError::malformed(kind, "missing `functionCall`"))?;
    let tool_name = call
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| PipelineError::malformed(kind, "missing `functionCall.name`"))?;

    let arguments = match call.parameters {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        // Some providers send arguments as a JSON-encoded string
        Some(Value::String(s)) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(map)) => map,
            _ => {
                return Err(PipelineError::malformed(
                    kind,
                    "`functionCall.parameters` is not a JSON object",
                ))
            },
        },
        Some(_) => {
            return Err(PipelineError::malformed(
                kind,
                "`functionCall.parameters` must be an object",
            ))
        },
    };

    Ok(FunctionCallRequest {
        call_id: call_id.to_string(),
        tool_name,
        arguments,
    })
}

fn parse_end_of_call(call_id: &str, raw: RawEndOfCall) -> Result<EndOfCallReport, PipelineError> {
    let kind = EventKind::EndOfCallReport.as_str();

    if raw.duration_seconds.is_some_and(|d| d < 0.0 || !d.is_finite()) {
        return Err(PipelineError::malformed(kind, "`durationSeconds` must be >= 0"));
    }
    if raw.cost.is_some_and(|c| c < 0.0 || !c.is_finite()) {
        return Err(PipelineError::malformed(kind, "`cost` must be >= 0"));
    }

    let duration_seconds = raw.duration_seconds.unwrap_or_else(|| match (raw.started_at, raw.ended_at) {
        (Some(start), Some(end)) if end >= start => (end - start).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
    });

    let artifact = raw.artifact.unwrap_or_default();
    let transcript = match artifact.messages.or(raw.messages) {
        Some(lines) if !lines.is_empty() => lines
            .into_iter()
            .filter_map(|line| {
                let text = line.message.or(line.content)?;
                if text.trim().is_empty() {
                    return None;
                }
                Some(TranscriptEntry {
                    speaker: line
                        .role
                        .as_deref()
                        .map_or(Speaker::System, Speaker::from_role),
                    text,
                    timestamp: line.seconds_from_start,
                })
            })
            .collect(),
        _ => artifact
            .transcript
            .or(raw.transcript)
            .map(|t| parse_plain_transcript(&t))
            .unwrap_or_default(),
    };

    Ok(EndOfCallReport {
        metrics: CallMetrics {
            call_id: call_id.to_string(),
            duration_seconds,
            cost: raw.cost.unwrap_or(0.0),
            ended_reason: raw.ended_reason,
            started_at: raw.started_at,
            ended_at: raw.ended_at,
        },
        transcript,
        platform_summary: raw.summary.or(raw.analysis.and_then(|a| a.summary)),
    })
}

/// Parse the platform's flat `AI: ...` / `User: ...` transcript text
///
/// Lines without a speaker prefix continue the previous entry.
pub fn parse_plain_transcript(text: &str) -> Vec<TranscriptEntry> {
    let mut entries: Vec<TranscriptEntry> = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let prefixed = line.split_once(':').and_then(|(prefix, rest)| {
            let speaker = match prefix.trim().to_ascii_lowercase().as_str() {
                "ai" | "assistant" | "bot" | "agent" => Speaker::Assistant,
                "user" | "customer" | "human" => Speaker::User,
                _ => return None,
            };
            Some(TranscriptEntry::new(speaker, rest.trim()))
        });

        match (prefixed, entries.last_mut()) {
            (Some(entry), _) => entries.push(entry),
            (None, Some(last)) => {
                last.text.push(' ');
                last.text.push_str(line);
            },
            (None, None) => entries.push(TranscriptEntry::new(Speaker::User, line)),
        }
    }

    entries
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}
