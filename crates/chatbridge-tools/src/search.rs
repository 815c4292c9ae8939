//! Web search backed by the Tavily search API.

use std::time::Duration;

use async_trait::async_trait;
use chatbridge_core::config::SearchConfig;
use chatbridge_core::ToolDefinition;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::registry::Tool;
use crate::ToolError;

/// Default Tavily search endpoint.
pub const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

/// Name the model uses to call this tool.
pub const WEB_SEARCH_TOOL: &str = "web_search";

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: u32,
    include_answer: bool,
    include_raw_content: bool,
}

/// The `web_search` tool.
///
/// Without an API key every search answers with a structured "not available"
/// payload and no network call is made.
pub struct WebSearchTool {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    search_depth: String,
    max_results: u32,
}

impl WebSearchTool {
    /// Create a search tool with default settings.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.filter(|k| !k.is_empty()),
            endpoint: TAVILY_SEARCH_URL.to_string(),
            search_depth: "advanced".to_string(),
            max_results: 5,
        }
    }

    /// Create a search tool from configuration.
    pub fn from_config(config: &SearchConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build search HTTP client, using defaults: {}", e);
                Client::new()
            });

        Self {
            client,
            api_key: config.resolve_api_key(),
            endpoint: config.endpoint.clone(),
            search_depth: config.search_depth.clone(),
            max_results: config.max_results,
        }
    }

    /// Set a custom endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Whether a credential is configured.
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    /// Search the web, always returning a JSON payload.
    ///
    /// On success this is the provider's response body verbatim; on failure
    /// it is `{"error", "details"?}`.
    pub async fn search(&self, query: &str) -> String {
        match self.try_search(query).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Web search failed: {}", e);
                e.to_payload()
            }
        }
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn try_search(&self, query: &str) -> Result<String, ToolError> {
        let api_key = self.api_key.as_deref().ok_or(ToolError::SearchUnavailable)?;

        let request = SearchRequest {
            query,
            search_depth: &self.search_depth,
            max_results: self.max_results,
            include_answer: true,
            include_raw_content: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ToolError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(ToolError::Api {
                status: status.as_u16(),
                body,
            });
        }

        debug!(bytes = body.len(), "Web search succeeded");
        Ok(body)
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        WEB_SEARCH_TOOL
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            WEB_SEARCH_TOOL,
            "Search the web for current information. Use this for recent events, facts you are \
             unsure about, or anything that may have changed after your training data.",
        )
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        }))
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let query = arguments
            .get("query")
            .and_then(|q| q.as_str())
            .ok_or_else(|| ToolError::missing_param("query"))?;
        self.try_search(query).await
    }
}
