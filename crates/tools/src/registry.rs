//! Tool Registry
//!
//! Manages tool registration, discovery, and execution.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::mcp::{Tool, ToolError, ToolOutput, ToolSchema};

/// Default timeout for tool execution (5 seconds)
const DEFAULT_TOOL_TIMEOUT_MS: u64 = 5000;

/// Tool executor trait
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a tool by name
    async fn execute(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError>;

    /// List available tools
    fn list_tools(&self) -> Vec<ToolSchema>;

    /// Get tool schema by name
    fn get_tool(&self, name: &str) -> Option<ToolSchema>;
}

/// Tool registry
///
/// Populated once at startup and then shared read-only, so lookups need no
/// locking.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    default_timeout_ms: u64,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            default_timeout_ms: DEFAULT_TOOL_TIMEOUT_MS,
        }
    }

    /// Set the timeout used by tools without their own
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Register a tool; a later registration under the same name replaces it
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Tool registered twice, keeping the latest");
        }
    }

    /// Get tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Check if tool exists
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Get all tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Effective time budget for `name`
    pub fn timeout_for(&self, name: &str) -> Duration {
        let ms = self
            .tools
            .get(name)
            .and_then(|t| t.timeout_ms())
            .unwrap_or(self.default_timeout_ms);
        Duration::from_millis(ms)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    /// Execute a tool with timeout protection
    ///
    /// The handler runs on its own task: a timeout aborts it and a panic is
    /// reported as an internal error instead of unwinding into the caller.
    async fn execute(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::not_found(format!("Tool not found: {}", name)))?;

        tool.validate(&arguments)?;

        let timeout = self.timeout_for(name);
        tracing::trace!(
            tool = name,
            timeout_ms = timeout.as_millis() as u64,
            "Executing tool with timeout"
        );

        let mut handle = tokio::spawn(async move { tool.execute(arguments).await });

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ToolError::internal(format!(
                "Tool {} aborted: {}",
                name, join_error
            ))),
            Err(_elapsed) => {
                handle.abort();
                Err(ToolError::timeout(name, timeout.as_millis() as u64))
            },
        }
    }

    fn list_tools(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    fn get_tool(&self, name: &str) -> Option<ToolSchema> {
        self.tools.get(name).map(|t| t.schema())
    }
}
