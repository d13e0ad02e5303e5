//! Flat metadata projection of an analysis result
//!
//! The platform dashboard renders call metadata as a flat key/value table,
//! so nested analysis structures are flattened into top-level keys.

use serde_json::{json, Map, Value};
use voice_webhook_core::CallAnalysisResult;

/// Version tag of the metadata layout
pub const ANALYSIS_VERSION: &str = "1.0";

/// Flatten a result into the metadata map attached to the platform call
pub fn format_analysis_for_platform(result: &CallAnalysisResult) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("analysis_version".into(), json!(ANALYSIS_VERSION));

    let metrics = &result.call_metrics;
    metadata.insert("duration_seconds".into(), json!(metrics.duration_seconds));
    metadata.insert("call_cost".into(), json!(metrics.cost));
    metadata.insert("ended_reason".into(), json!(metrics.ended_reason));

    if let Some(analysis) = &result.transcript_analysis {
        metadata.insert("conversion_status".into(), json!(analysis.conversion_status.as_str()));
        metadata.insert("conversion_confidence".into(), json!(analysis.conversion_confidence));
        metadata.insert(
            "satisfaction_level".into(),
            json!(analysis.satisfaction_level.map(|l| l.as_str())),
        );
        metadata.insert("satisfaction_score".into(), json!(analysis.satisfaction_score));
        metadata.insert("satisfaction_reasoning".into(), json!(analysis.satisfaction_reasoning));
        metadata.insert("key_objections".into(), json!(analysis.objections));
        metadata.insert("positive_signals".into(), json!(analysis.positive_signals));
        metadata.insert("language_detected".into(), json!(analysis.language_detected));
        metadata.insert("summary".into(), json!(analysis.summary));
    }

    let eligibility = result
        .transcript_analysis
        .as_ref()
        .and_then(|a| a.eligibility_outcome);
    metadata.insert(
        "eligibility_checked".into(),
        json!(eligibility.map_or(false, |e| e.was_checked())),
    );
    metadata.insert("eligibility_status".into(), json!(eligibility.map(|e| e.as_str())));
    let analysis = result.transcript_analysis.as_ref();
    metadata.insert(
        "customer_income".into(),
        json!(analysis.and_then(|a| a.customer_income)),
    );
    metadata.insert(
        "has_existing_credit".into(),
        json!(analysis.and_then(|a| a.has_existing_credit)),
    );

    if let Some(error) = &result.analysis_error {
        metadata.insert("analysis_error".into(), json!(error));
    }

    metadata.insert("analyzed_at".into(), json!(result.analyzed_at.to_rfc3339()));
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_webhook_core::{
        CallMetrics, ConversionStatus, EligibilityOutcome, SatisfactionLevel, TranscriptAnalysis,
    };

    fn analysis() -> TranscriptAnalysis {
        TranscriptAnalysis {
            conversion_status: ConversionStatus::Converted,
            conversion_confidence: 0.9,
            satisfaction_level: Some(SatisfactionLevel::Satisfied),
            satisfaction_score: Some(4),
            satisfaction_reasoning: "Engaged and positive".to_string(),
            objections: vec!["annual fee too high".to_string()],
            positive_signals: vec!["asked about rewards".to_string()],
            eligibility_outcome: Some(EligibilityOutcome::Eligible),
            customer_income: Some(30000.0),
            has_existing_credit: Some(true),
            language_detected: Some("en".to_string()),
            summary: "Customer agreed to apply.".to_string(),
        }
    }

    #[test]
    fn test_full_projection() {
        let mut metrics = CallMetrics::new("c1");
        metrics.duration_seconds = 120.0;
        metrics.cost = 0.42;
        metrics.ended_reason = Some("customer-ended-call".to_string());

        let metadata = format_analysis_for_platform(&CallAnalysisResult::new(metrics, Some(analysis())));

        assert_eq!(metadata["analysis_version"], "1.0");
        assert_eq!(metadata["duration_seconds"], 120.0);
        assert_eq!(metadata["call_cost"], 0.42);
        assert_eq!(metadata["conversion_status"], "converted");
        assert_eq!(metadata["satisfaction_level"], "satisfied");
        assert_eq!(metadata["key_objections"][0], "annual fee too high");
        assert_eq!(metadata["eligibility_checked"], true);
        assert_eq!(metadata["eligibility_status"], "eligible");
        assert!(!metadata.contains_key("analysis_error"));
        assert!(metadata["analyzed_at"].is_string());
    }

    #[test]
    fn test_eligibility_inputs_projected() {
        let metadata =
            format_analysis_for_platform(&CallAnalysisResult::new(CallMetrics::new("c4"), Some(analysis())));
        assert_eq!(metadata["customer_income"], 30000.0);
        assert_eq!(metadata["has_existing_credit"], true);

        let mut unstated = analysis();
        unstated.customer_income = None;
        unstated.has_existing_credit = None;
        let metadata =
            format_analysis_for_platform(&CallAnalysisResult::new(CallMetrics::new("c5"), Some(unstated)));
        assert!(metadata.contains_key("customer_income"));
        assert!(metadata["customer_income"].is_null());
        assert!(metadata["has_existing_credit"].is_null());
        assert!(metadata["analyzed_at"].is_string());
    }

    #[test]
    fn test_projection_without_analysis() {
        let result = CallAnalysisResult::new(CallMetrics::new("c2"), None).with_error("transcript too short");
        let metadata = format_analysis_for_platform(&result);

        assert!(!metadata.contains_key("conversion_status"));
        assert_eq!(metadata["eligibility_checked"], false);
        assert!(metadata["eligibility_status"].is_null());
        assert!(metadata["customer_income"].is_null());
        assert_eq!(metadata["analysis_error"], "transcript too short");
    }

    #[test]
    fn test_values_are_flat() {
        let metadata =
            format_analysis_for_platform(&CallAnalysisResult::new(CallMetrics::new("c3"), Some(analysis())));
        assert!(metadata.values().all(|v| !v.is_object()));
    }
}
