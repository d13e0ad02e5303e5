//! Eligibility Check Tool
//!
//! Mock credit card eligibility: an annual income at or above the threshold
//! qualifies; below it, existing credit history sends the application to
//! manual review; otherwise the customer is not eligible.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::mcp::{InputSchema, PropertySchema, Tool, ToolError, ToolOutput, ToolSchema};

/// Name used by current assistant configurations
pub const TOOL_NAME: &str = "check_eligibility";
/// Name used by earlier assistant configurations
pub const LEGACY_TOOL_NAME: &str = "check_credit_card_eligibility";

/// Minimum annual income for automatic approval
pub const MIN_INCOME_THRESHOLD: f64 = 25_000.0;

const ELIGIBLE_MESSAGE: &str =
    "Great news! Based on the information provided, you appear to be eligible for the Bank-travel credit card.";
const ELIGIBLE_ACTION: &str =
    "You can proceed with the application. Would you like me to help you get started?";
const REVIEW_MESSAGE: &str =
    "Based on your income and credit history, your application would need a quick review by our team.";
const REVIEW_ACTION: &str = "I can submit your application for review. Our team typically responds within 1-2 business days. Would you like to proceed?";
const NOT_ELIGIBLE_MESSAGE: &str =
    "Unfortunately, based on the information provided, you don't currently qualify for this credit card.";
const NOT_ELIGIBLE_ACTION: &str = "I'd recommend our Starter Credit Card, which is designed to help build credit history. Can I transfer you to a human representative who can tell you more about that option?";

/// Eligibility status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityStatus {
    Eligible,
    ReviewRequired,
    NotEligible,
}

/// Result of an eligibility check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityResult {
    /// True only for [`EligibilityStatus::Eligible`]
    pub eligible: bool,
    pub status: EligibilityStatus,
    pub message: String,
    pub recommended_action: String,
    /// `message` and `recommended_action` joined, ready to be spoken
    pub spoken_response: String,
    pub income: f64,
    pub credit_history: Option<bool>,
}

/// Pure eligibility decision
pub fn check_eligibility(income: f64, credit_history: Option<bool>) -> EligibilityResult {
    let (status, message, action) = if income >= MIN_INCOME_THRESHOLD {
        (EligibilityStatus::Eligible, ELIGIBLE_MESSAGE, ELIGIBLE_ACTION)
    } else if credit_history == Some(true) {
        (EligibilityStatus::ReviewRequired, REVIEW_MESSAGE, REVIEW_ACTION)
    } else {
        (EligibilityStatus::NotEligible, NOT_ELIGIBLE_MESSAGE, NOT_ELIGIBLE_ACTION)
    };

    EligibilityResult {
        eligible: status == EligibilityStatus::Eligible,
        status,
        message: message.to_string(),
        recommended_action: action.to_string(),
        spoken_response: format!("{} {}", message, action),
        income,
        credit_history,
    }
}

/// Check eligibility tool
///
/// Registered once per name it answers to; both variants accept either
/// argument spelling.
pub struct EligibilityCheckTool {
    name: &'static str,
    income_param: &'static str,
    credit_param: &'static str,
}

impl EligibilityCheckTool {
    /// `check_eligibility(income, credit_history)`
    pub fn new() -> Self {
        Self {
            name: TOOL_NAME,
            income_param: "income",
            credit_param: "credit_history",
        }
    }

    /// `check_credit_card_eligibility(annual_income, has_existing_credit)`
    pub fn legacy() -> Self {
        Self {
            name: LEGACY_TOOL_NAME,
            income_param: "annual_income",
            credit_param: "has_existing_credit",
        }
    }

    fn parse_input(&self, input: &Value) -> Result<(f64, Option<bool>), ToolError> {
        let args = input
            .as_object()
            .ok_or_else(|| ToolError::invalid_params("arguments must be an object"))?;

        let income_value = first_present(args, &["income", "annual_income"]).ok_or_else(|| {
            ToolError::invalid_params(format!("{} is required", self.income_param))
        })?;
        let income = parse_amount(income_value).ok_or_else(|| {
            ToolError::invalid_params(format!("{} must be a number", self.income_param))
        })?;
        if !income.is_finite() || income < 0.0 {
            return Err(ToolError::invalid_params(format!(
                "{} must be a non-negative number",
                self.income_param
            )));
        }

        let credit_history = match first_present(args, &["credit_history", "has_existing_credit"]) {
            None => None,
            Some(value) => Some(parse_flag(value).ok_or_else(|| {
                ToolError::invalid_params(format!("{} must be a boolean", self.credit_param))
            })?),
        };

        Ok((income, credit_history))
    }
}

impl Default for EligibilityCheckTool {
    fn default() -> Self {
        Self::new()
    }
}

fn first_present<'a>(args: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| args.get(*k))
        .find(|v| !v.is_null())
}

/// Accept numbers and spoken-style strings such as `"$30,000"`
fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, '$' | ',' | ' '))
                .collect();
            cleaned.parse().ok()
        },
        _ => None,
    }
}

fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" => Some(true),
            "false" | "no" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[async_trait]
impl Tool for EligibilityCheckTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Check if a customer is eligible for the Bank-travel credit card based on their income and credit history"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.to_string(),
            description: self.description().to_string(),
            input_schema: InputSchema::object()
                .property(
                    self.income_param,
                    PropertySchema::number("Customer's annual income in USD").with_minimum(0.0),
                    true,
                )
                .property(
                    self.credit_param,
                    PropertySchema::boolean(
                        "Whether the customer has existing credit history (credit cards, loans, etc.)",
                    ),
                    false,
                ),
        }
    }

    /// Lenient about argument spelling and string-encoded values
    fn validate(&self, input: &Value) -> Result<(), ToolError> {
        self.parse_input(input).map(|_| ())
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let (income, credit_history) = self.parse_input(&input)?;
        let result = check_eligibility(income, credit_history);

        tracing::info!(
            tool = self.name,
            income,
            credit_history = ?credit_history,
            status = ?result.status,
            "Eligibility checked"
        );

        serde_json::to_value(&result)
            .map(ToolOutput::json)
            .map_err(|e| ToolError::from_cause("failed to encode eligibility result", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_threshold_decisions() {
        assert_eq!(check_eligibility(50_000.0, None).status, EligibilityStatus::Eligible);
        assert_eq!(check_eligibility(25_000.0, None).status, EligibilityStatus::Eligible);
        assert_eq!(
            check_eligibility(20_000.0, Some(true)).status,
            EligibilityStatus::ReviewRequired
        );
        assert_eq!(
            check_eligibility(15_000.0, Some(false)).status,
            EligibilityStatus::NotEligible
        );
        assert_eq!(check_eligibility(15_000.0, None).status, EligibilityStatus::NotEligible);
        assert_eq!(check_eligibility(0.0, Some(false)).status, EligibilityStatus::NotEligible);
    }

    #[test]
    fn test_spoken_response_joins_message_and_action() {
        let result = check_eligibility(30_000.0, None);
        assert!(result.eligible);
        assert!(result.spoken_response.starts_with(&result.message));
        assert!(result.spoken_response.ends_with(&result.recommended_action));

        let review = check_eligibility(10_000.0, Some(true));
        assert!(!review.eligible);
    }

    #[tokio::test]
    async fn test_execute_with_either_spelling() {
        let tool = EligibilityCheckTool::new();
        let output = tool
            .execute(json!({ "income": 30000, "credit_history": true }))
            .await
            .unwrap();
        assert_eq!(output.content["eligible"], true);
        assert_eq!(output.content["status"], "eligible");
        assert_eq!(output.content["income"], 30000.0);

        let legacy = EligibilityCheckTool::legacy();
        let output = legacy
            .execute(json!({ "annual_income": "$20,000", "has_existing_credit": "yes" }))
            .await
            .unwrap();
        assert_eq!(output.content["status"], "review_required");
    }

    #[test]
    fn test_validation() {
        let tool = EligibilityCheckTool::new();
        assert!(tool.validate(&json!({ "income": 1000 })).is_ok());
        assert!(tool.validate(&json!({})).is_err());
        assert!(tool.validate(&json!({ "income": "lots" })).is_err());
        assert!(tool.validate(&json!({ "income": -5 })).is_err());
        assert!(tool
            .validate(&json!({ "income": 1000, "credit_history": "maybe" }))
            .is_err());
    }

    #[test]
    fn test_schema_uses_variant_parameter_names() {
        let schema = EligibilityCheckTool::legacy().schema();
        assert_eq!(schema.name, LEGACY_TOOL_NAME);
        assert_eq!(schema.input_schema.required, vec!["annual_income"]);
        assert!(schema.input_schema.properties.contains_key("has_existing_credit"));
    }
}
