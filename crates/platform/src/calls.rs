//! Call records as returned by the platform's read API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// The subset of a platform call record used by tooling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "type")]
    pub call_type: Option<String>,
    /// Seconds, when the platform reports it directly
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub ended_reason: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assistant: Option<AssistantRef>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl CallSummary {
    /// Reported duration, or the span between start and end
    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration.or_else(|| {
            let (start, end) = (self.started_at?, self.ended_at?);
            Some((end - start).num_milliseconds().max(0) as f64 / 1000.0)
        })
    }
}

/// `Mm Ss`, or `N/A` when unknown
pub fn format_duration(seconds: Option<f64>) -> String {
    match seconds {
        Some(s) if s.is_finite() && s >= 0.0 => {
            let total = s as u64;
            format!("{}m {}s", total / 60, total % 60)
        },
        _ => "N/A".to_string(),
    }
}

/// `$0.0000`, or `N/A` when unknown
pub fn format_cost(cost: Option<f64>) -> String {
    match cost {
        Some(c) => format!("${:.4}", c),
        None => "N/A".to_string(),
    }
}
