//! Function-Call Dispatcher
//!
//! Routes a classified function-call event to its tool and shapes the
//! synchronous answer. Dispatch is stateless per request; the registry is
//! read-only after startup.

use std::sync::Arc;
use std::time::Instant;

use voice_webhook_core::{FunctionCallRequest, FunctionCallResult, PipelineError};

use crate::mcp::{ErrorCode, ToolError};
use crate::registry::{ToolExecutor, ToolRegistry};

/// Said to the caller when a tool runs out of time
pub const TIMEOUT_FALLBACK: &str =
    "I'm sorry, that's taking a little longer than expected. Let me help you another way.";
/// Said to the caller when a tool fails
pub const ERROR_FALLBACK: &str =
    "I'm sorry, I wasn't able to check that right now. Could we try again in a moment?";

pub struct FunctionCallDispatcher {
    registry: Arc<ToolRegistry>,
}

impl FunctionCallDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Invoke the requested tool
    ///
    /// Fails with `UnknownTool` when nothing is registered under the name,
    /// `ToolTimeout` when the handler exceeds its budget and
    /// `ToolExecutionError` (cause preserved) for anything else.
    pub async fn dispatch(
        &self,
        request: &FunctionCallRequest,
    ) -> Result<FunctionCallResult, PipelineError> {
        let tool = request.tool_name.as_str();
        if !self.registry.has(tool) {
            metrics::counter!("tool_calls_total", "tool" => "unknown", "outcome" => "unknown_tool")
                .increment(1);
            tracing::warn!(call_id = %request.call_id, tool, "Function call for unknown tool");
            return Err(PipelineError::UnknownTool(request.tool_name.clone()));
        }

        let start = Instant::now();
        let arguments = serde_json::Value::Object(request.arguments.clone());
        let outcome = self.registry.execute(tool, arguments).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        metrics::histogram!("tool_latency_ms", "tool" => tool.to_string()).record(elapsed_ms);

        let result = outcome
            .map(|output| FunctionCallResult::ok(tool, output.content))
            .map_err(|e| self.classify_failure(tool, e));

        let label = match &result {
            Ok(_) => "ok",
            Err(PipelineError::ToolTimeout { .. }) => "timeout",
            Err(_) => "error",
        };
        metrics::counter!("tool_calls_total", "tool" => tool.to_string(), "outcome" => label)
            .increment(1);

        match &result {
            Ok(_) => tracing::info!(
                call_id = %request.call_id,
                tool,
                elapsed_ms = elapsed_ms as u64,
                "Function call completed"
            ),
            Err(e) => tracing::warn!(
                call_id = %request.call_id,
                tool,
                elapsed_ms = elapsed_ms as u64,
                error = %e,
                "Function call failed"
            ),
        }

        result
    }

    /// Dispatch and always produce a response body
    ///
    /// Failures become a result with an `error` object; timeouts and handler
    /// errors also carry a spoken fallback so the conversation can continue.
    pub async fn respond(
        &self,
        request: &FunctionCallRequest,
    ) -> (FunctionCallResult, Option<PipelineError>) {
        match self.dispatch(request).await {
            Ok(result) => (result, None),
            Err(err) => {
                let body = FunctionCallResult::failed(&request.tool_name, &err);
                let body = match &err {
                    PipelineError::ToolTimeout { .. } => body.with_fallback(TIMEOUT_FALLBACK),
                    PipelineError::ToolExecutionError { .. } => body.with_fallback(ERROR_FALLBACK),
                    _ => body,
                };
                (body, Some(err))
            },
        }
    }

    fn classify_failure(&self, tool: &str, error: ToolError) -> PipelineError {
        match error.code {
            ErrorCode::NotFound => PipelineError::UnknownTool(tool.to_string()),
            ErrorCode::Timeout => PipelineError::ToolTimeout {
                tool: tool.to_string(),
                timeout_ms: self.registry.timeout_for(tool).as_millis() as u64,
            },
            ErrorCode::InvalidParams | ErrorCode::Internal => {
                PipelineError::tool_execution(tool, error)
            },
        }
    }
}
