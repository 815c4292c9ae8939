//! Tool registry and invocation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chatbridge_core::{ToolCallRequest, ToolDefinition};
use tracing::{debug, warn};

use crate::ToolError;

/// Trait for implementing tools.
///
/// Each tool has a name, a definition (including the JSON schema declared to
/// the model) and an async execute method taking the parsed arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the unique name of this tool.
    fn name(&self) -> &str;

    /// Get the tool definition including parameter schema.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool, returning the text handed back to the model.
    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError>;
}

/// Registry of available tools, keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool exists.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions of all tools, ordered by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call, surfacing failures as errors.
    pub async fn execute(&self, call: &ToolCallRequest) -> Result<String, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        let arguments = call
            .parse_arguments()
            .map_err(|e| ToolError::invalid_args(e.to_string()))?;

        let start = std::time::Instant::now();
        let output = tool.execute(arguments).await?;
        debug!(
            tool = %call.name,
            call_id = %call.id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tool executed"
        );
        Ok(output)
    }

    /// Execute a tool call, always producing a payload for the model.
    pub async fn invoke(&self, call: &ToolCallRequest) -> String {
        match self.execute(call).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, "Tool call failed: {}", e);
                e.to_payload()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("echo", "Echo the input back")
        }

        async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
            let text = arguments["text"]
                .as_str()
                .ok_or_else(|| ToolError::missing_param("text"))?;
            Ok(text.to_string())
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry
    }

    #[test]
    fn test_register_and_get() {
        let registry = registry();
        assert!(registry.contains("echo"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.definitions()[0].name, "echo");
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let call = ToolCallRequest::new("c1", "echo", r#"{"text":"hi"}"#);
        assert_eq!(registry().invoke(&call).await, "hi");
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool_returns_payload() {
        let call = ToolCallRequest::new("c1", "nope", "{}");
        let payload: serde_json::Value =
            serde_json::from_str(&registry().invoke(&call).await).unwrap();
        assert_eq!(payload["error"], "Unknown tool: nope");
    }

    #[tokio::test]
    async fn test_invoke_malformed_arguments_returns_payload() {
        let call = ToolCallRequest::new("c1", "echo", r#"{"text": "unterminated"#);
        let payload: serde_json::Value =
            serde_json::from_str(&registry().invoke(&call).await).unwrap();
        assert_eq!(payload["error"], "Invalid tool arguments");
        assert!(payload["details"].is_string());
    }

    #[tokio::test]
    async fn test_invoke_missing_parameter_returns_payload() {
        let call = ToolCallRequest::new("c1", "echo", "{}");
        let payload: serde_json::Value =
            serde_json::from_str(&registry().invoke(&call).await).unwrap();
        assert_eq!(payload["error"], "Missing required parameter: text");
    }
}
