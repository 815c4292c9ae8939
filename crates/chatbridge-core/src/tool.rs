//! Tool definitions and tool-call request types.

use serde::{Deserialize, Serialize};

/// Definition of a tool declared to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (unique identifier)
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition with an empty parameter schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    /// Set the parameters schema.
    pub fn with_parameters(mut self, schema: serde_json::Value) -> Self {
        self.parameters = schema;
        self
    }
}

/// A tool call requested by the model.
///
/// `arguments` is the raw JSON text exactly as the model streamed it. It is
/// only expected to parse once the stream reported that tool calls are ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique ID for this tool call
    pub id: String,
    /// Tool name
    pub name: String,
    /// Arguments as a JSON string
    pub arguments: String,
}

impl ToolCallRequest {
    /// Create a new tool call request.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the arguments as JSON.
    pub fn parse_arguments(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        let call = ToolCallRequest::new("call_1", "web_search", r#"{"query": "rust"}"#);
        let args = call.parse_arguments().unwrap();
        assert_eq!(args["query"], "rust");
    }

    #[test]
    fn test_parse_incomplete_arguments_fails() {
        let call = ToolCallRequest::new("call_1", "web_search", r#"{"query": "ru"#);
        assert!(call.parse_arguments().is_err());
    }
}
