//! Extraction prompt, target schema and output validation

use jsonschema::JSONSchema;
use serde_json::{json, Map, Value};
use voice_webhook_core::{
    CallMetrics, ConversionStatus, EligibilityOutcome, SatisfactionLevel, TranscriptAnalysis,
    SATISFACTION_SCORE_RANGE,
};

use crate::AnalysisError;

pub(crate) const SYSTEM_PROMPT: &str = "You are an expert at analyzing customer service call \
transcripts from a bank's credit card offer campaign. Always respond with a single valid JSON \
object and nothing else.";

/// JSON Schema every extraction must satisfy
pub fn analysis_schema() -> Value {
    let nullable_enum = |values: &[&str]| {
        let mut items: Vec<Value> = values.iter().map(|v| json!(v)).collect();
        items.push(Value::Null);
        Value::Array(items)
    };

    json!({
        "type": "object",
        "required": [
            "conversion_status",
            "satisfaction_score",
            "objections",
            "eligibility_outcome",
            "summary"
        ],
        "properties": {
            "conversion_status": { "type": "string", "enum": ConversionStatus::ALL },
            "conversion_confidence": { "type": "number" },
            "satisfaction_level": {
                "type": ["string", "null"],
                "enum": nullable_enum(&SatisfactionLevel::ALL)
            },
            "satisfaction_score": {
                "type": ["integer", "null"],
                "minimum": *SATISFACTION_SCORE_RANGE.start(),
                "maximum": *SATISFACTION_SCORE_RANGE.end()
            },
            "satisfaction_reasoning": { "type": "string" },
            "objections": { "type": "array", "items": { "type": "string" } },
            "positive_signals": { "type": "array", "items": { "type": "string" } },
            "eligibility_outcome": {
                "type": ["string", "null"],
                "enum": nullable_enum(&EligibilityOutcome::ALL)
            },
            "customer_income": { "type": ["number", "null"], "minimum": 0 },
            "has_existing_credit": { "type": ["boolean", "null"] },
            "language_detected": { "type": ["string", "null"] },
            "summary": { "type": "string", "minLength": 1 }
        }
    })
}

/// User prompt embedding the transcript, call metadata and target schema
pub(crate) fn build_prompt(transcript: &str, metrics: &CallMetrics, platform_summary: Option<&str>) -> String {
    let mut prompt = String::from(
        "Analyze the call transcript below and extract:\n\
         - conversion_status: did the customer agree to apply for the credit card? \
         \"converted\" (explicitly agreed), \"interested\" (interested but no commitment), \
         \"not_interested\" (declined), or \"unknown\"\n\
         - conversion_confidence: your confidence in that assessment, 0.0 to 1.0\n\
         - satisfaction_level: very_satisfied, satisfied, neutral, dissatisfied or very_dissatisfied\n\
         - satisfaction_score: integer 1 (very dissatisfied) to 5 (very satisfied), or null if the \
         customer barely spoke\n\
         - satisfaction_reasoning: one or two sentences\n\
         - objections: concerns the customer raised, in the order raised (e.g. \"annual fee too high\")\n\
         - positive_signals: signs of interest (e.g. \"asked about rewards\")\n\
         - eligibility_outcome: result of any eligibility check discussed: eligible, \
         review_required, not_eligible, or not_checked\n\
         - customer_income: annual income the customer stated, as a number, or null\n\
         - has_existing_credit: whether the customer said they have existing credit, or null\n\
         - language_detected: primary language code such as \"en\" or \"es\"\n\
         - summary: two or three sentences describing the call\n\n",
    );

    prompt.push_str("The JSON object must validate against this JSON Schema:\n");
    prompt.push_str(&analysis_schema().to_string());
    prompt.push_str("\n\nCALL METADATA:\n");
    prompt.push_str(&format!("duration_seconds: {:.0}\n", metrics.duration_seconds));
    if let Some(reason) = &metrics.ended_reason {
        prompt.push_str(&format!("ended_reason: {}\n", reason));
    }
    if let Some(summary) = platform_summary.filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("platform_summary: {}\n", summary.trim()));
    }
    prompt.push_str("\nTRANSCRIPT:\n");
    prompt.push_str(transcript);
    prompt
}

/// Follow-up asking the model to fix its previous answer
pub(crate) fn corrective_prompt(errors: &[String]) -> String {
    let mut prompt = String::from(
        "Your previous response was rejected because it did not match the required schema:\n",
    );
    for error in errors {
        prompt.push_str("- ");
        prompt.push_str(error);
        prompt.push('\n');
    }
    prompt.push_str("Respond again with only the corrected JSON object.");
    prompt
}

/// Remove a surrounding markdown code fence, with or without a language tag
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Validates raw model output into a [`TranscriptAnalysis`]
pub struct AnalysisValidator {
    schema: JSONSchema,
}

impl AnalysisValidator {
    pub fn new() -> Result<Self, AnalysisError> {
        let schema = analysis_schema();
        let compiled = JSONSchema::compile(&schema).map_err(|e| AnalysisError::Schema(e.to_string()))?;
        Ok(Self { schema: compiled })
    }

    /// Parse model output, returning every problem found on failure
    pub fn parse(&self, raw: &str) -> Result<TranscriptAnalysis, Vec<String>> {
        let body = strip_code_fences(raw);
        if body.is_empty() {
            return Err(vec!["response was empty".to_string()]);
        }

        let mut value: Value =
            serde_json::from_str(body).map_err(|e| vec![format!("response is not valid JSON: {}", e)])?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| vec!["response must be a JSON object".to_string()])?;
        normalize(object);

        if let Err(errors) = self.schema.validate(&value) {
            return Err(errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect());
        }

        let mut analysis: TranscriptAnalysis =
            serde_json::from_value(value).map_err(|e| vec![e.to_string()])?;
        analysis.conversion_confidence = clamp_confidence(analysis.conversion_confidence);
        Ok(analysis)
    }
}

/// Tolerated spelling variants, applied before schema validation
fn normalize(object: &mut Map<String, Value>) {
    if !object.contains_key("objections") {
        if let Some(objections) = object.remove("key_objections") {
            object.insert("objections".to_string(), objections);
        }
    }
    if !object.contains_key("customer_income") {
        if let Some(income) = object.remove("annual_income") {
            object.insert("customer_income".to_string(), income);
        }
    }

    // `4.0` passes an "integer" schema check but not integer deserialization
    if let Some(score) = object.get_mut("satisfaction_score").filter(|s| s.is_f64()) {
        if let Some(f) = score.as_f64().filter(|f| f.fract() == 0.0) {
            *score = json!(f as i64);
        }
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
