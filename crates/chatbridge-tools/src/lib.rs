//! # chatbridge-tools
//!
//! Tools the model can call while answering a chat message.
//!
//! Tools implement the [`Tool`] trait and are registered with a
//! [`ToolRegistry`]. Invoking a call through the registry never fails: any
//! problem (unknown tool, malformed arguments, transport or API failure) is
//! converted into a JSON `{"error", "details"}` payload that goes back to the
//! model as the tool result.
//!
//! ## Example
//!
//! ```ignore
//! use chatbridge_tools::{ToolRegistry, WebSearchTool};
//! use std::sync::Arc;
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(Arc::new(WebSearchTool::new(std::env::var("TAVILY_API_KEY").ok())));
//!
//! let call = ToolCallRequest::new("call_1", "web_search", r#"{"query":"rust 2024 edition"}"#);
//! let payload = registry.invoke(&call).await;
//! ```

use serde_json::json;
use thiserror::Error;

pub mod registry;
pub mod search;

pub use registry::{Tool, ToolRegistry};
pub use search::WebSearchTool;

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool was not found in the registry.
    #[error("Unknown tool: {0}")]
    NotFound(String),

    /// Arguments were not valid JSON or had the wrong shape.
    #[error("Invalid tool arguments")]
    InvalidArguments(String),

    /// Required parameter is missing.
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// No search credential is configured.
    #[error("Web Search is Not Available. No search API key is configured.")]
    SearchUnavailable,

    /// The HTTP request could not be completed.
    #[error("Failed to perform web search")]
    Request(String),

    /// The search provider answered with a non-success status.
    #[error("Web search failed with status {status}")]
    Api { status: u16, body: String },
}

impl ToolError {
    /// Create an invalid arguments error.
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a missing parameter error.
    pub fn missing_param(name: impl Into<String>) -> Self {
        Self::MissingParameter(name.into())
    }

    /// Extra context for the model, if any.
    pub fn details(&self) -> Option<&str> {
        match self {
            ToolError::InvalidArguments(details) | ToolError::Request(details) => Some(details),
            ToolError::Api { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Serialize as the `{"error", "details"?}` payload fed back to the model.
    pub fn to_payload(&self) -> String {
        let mut payload = json!({ "error": self.to_string() });
        if let Some(details) = self.details() {
            payload["details"] = json!(details);
        }
        payload.to_string()
    }
}
