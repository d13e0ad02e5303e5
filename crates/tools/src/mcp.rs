//! Tool interface
//!
//! MCP-style tool types: a named tool with a description, a JSON-Schema input
//! definition and an async `execute`. Schemas serialize to the same shape the
//! platform expects in an assistant's function definitions.

use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use voice_webhook_core::BoxError;

/// Tool error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidParams,
    NotFound,
    Timeout,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::InvalidParams => write!(f, "invalid params"),
            ErrorCode::NotFound => write!(f, "not found"),
            ErrorCode::Timeout => write!(f, "timeout"),
            ErrorCode::Internal => write!(f, "internal error"),
        }
    }
}

/// Tool error
#[derive(Error, Debug)]
#[error("{code}: {message}")]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    source: Option<BoxError>,
}

impl ToolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn timeout(tool: &str, timeout_ms: u64) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Tool {} timed out after {}ms", tool, timeout_ms),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Wrap a downstream failure, keeping it as the error source
    pub fn from_cause<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            code: ErrorCode::Internal,
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }
}

/// Property schema for one tool parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub prop_type: String,
    pub description: String,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
}

impl PropertySchema {
    fn typed(prop_type: &str, description: impl Into<String>) -> Self {
        Self {
            prop_type: prop_type.to_string(),
            description: description.into(),
            enum_values: None,
            minimum: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::typed("string", description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::typed("number", description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::typed("boolean", description)
    }

    pub fn enum_type(description: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            enum_values: Some(values),
            ..Self::typed("string", description)
        }
    }

    pub fn with_minimum(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }
}

/// JSON-Schema object describing a tool's arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl InputSchema {
    pub fn object() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn property(mut self, name: &str, schema: PropertySchema, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Validate `input` against this schema, collecting every violation
    pub fn validate(&self, input: &Value) -> Result<(), ToolError> {
        let schema = serde_json::to_value(self)
            .map_err(|e| ToolError::internal(format!("unserializable schema: {}", e)))?;
        let compiled = JSONSchema::compile(&schema)
            .map_err(|e| ToolError::internal(format!("failed to compile schema: {}", e)))?;

        let result = match compiled.validate(input) {
            Ok(()) => Ok(()),
            Err(errors) => {
                let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
                Err(ToolError::invalid_params(messages.join("; ")))
            },
        };
        result
    }
}

/// Tool schema as listed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    #[serde(rename = "parameters")]
    pub input_schema: InputSchema,
}

/// Tool output
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: Value,
}

impl ToolOutput {
    pub fn json(content: Value) -> Self {
        Self { content }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Value::String(text.into()),
        }
    }
}

/// A callable tool
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn schema(&self) -> ToolSchema;

    async fn execute(&self, input: Value) -> Result<ToolOutput, ToolError>;

    /// Check arguments before execution; defaults to JSON-Schema validation
    fn validate(&self, input: &Value) -> Result<(), ToolError> {
        self.schema().input_schema.validate(input)
    }

    /// Tool-specific time budget; `None` uses the registry default
    fn timeout_ms(&self) -> Option<u64> {
        None
    }
}
