//! Tools for live calls
//!
//! Implements an MCP-style tool interface, the registry tools are looked up
//! in, and the dispatcher that answers the platform's function-call events.

pub mod dispatcher;
pub mod domain_tools;
pub mod mcp;
pub mod registry;

pub use dispatcher::{FunctionCallDispatcher, ERROR_FALLBACK, TIMEOUT_FALLBACK};
pub use domain_tools::{
    check_eligibility, register_domain_tools, EligibilityCheckTool, EligibilityResult,
    EligibilityStatus,
};
pub use mcp::{ErrorCode, InputSchema, PropertySchema, Tool, ToolError, ToolOutput, ToolSchema};
pub use registry::{ToolExecutor, ToolRegistry};

use std::time::Duration;
use voice_webhook_config::DispatchConfig;

/// Build the registry with every domain tool registered
pub fn create_registry(config: &DispatchConfig) -> ToolRegistry {
    let mut registry =
        ToolRegistry::new().with_default_timeout(Duration::from_millis(config.default_timeout_ms));
    register_domain_tools(&mut registry);
    tracing::info!(tools = ?registry.tool_names(), "Tool registry ready");
    registry
}
