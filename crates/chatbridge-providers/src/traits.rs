//! Provider trait definitions.

use std::pin::Pin;

use async_trait::async_trait;
use chatbridge_core::{ToolDefinition, Turn};
use futures::Stream;
use serde::{Deserialize, Serialize};

/// Request for a streamed completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model to use (empty selects the provider default)
    pub model: String,
    /// Conversation turns, system prompt first
    pub messages: Vec<Turn>,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Tools the model may call
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
}

/// Reason a streamed completion finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Normal completion
    Stop,
    /// Hit max tokens limit
    Length,
    /// Tool calls requested
    ToolCalls,
    /// Content was filtered
    ContentFilter,
    /// Any reason this crate does not model
    Other(String),
}

impl FinishReason {
    /// Map a wire finish reason.
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "tool_calls" | "function_call" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

/// Incremental piece of a tool call, keyed by its index in the response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Stable index of the call within the response
    pub index: usize,
    /// Tool call ID (usually only on the first fragment)
    pub id: Option<String>,
    /// Tool name fragment
    pub name: Option<String>,
    /// Arguments fragment (partial JSON text)
    pub arguments: Option<String>,
}

/// One incremental unit of a streamed model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fragment {
    /// Display text to append
    TextDelta(String),
    /// Part of a tool call
    ToolCallDelta(ToolCallDelta),
    /// The model finished, with a reason
    Finish(FinishReason),
}

/// Stream of fragments produced by a provider.
pub type FragmentStream = Pin<Box<dyn Stream<Item = anyhow::Result<Fragment>> + Send>>;

/// Core provider trait - streaming completion backends implement this.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Check if provider is configured and ready.
    fn is_configured(&self) -> bool;

    /// Start a streamed completion.
    ///
    /// Dropping the returned stream abandons the underlying request.
    async fn complete_stream(&self, request: CompletionRequest) -> anyhow::Result<FragmentStream>;
}
