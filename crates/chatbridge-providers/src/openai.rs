//! OpenAI-compatible chat completions provider (streaming).

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use chatbridge_core::error::ProviderError;
use chatbridge_core::{Role, ToolDefinition, Turn};

use crate::sse::SseParser;
use crate::traits::{
    CompletionRequest, FinishReason, Fragment, FragmentStream, Provider, ToolCallDelta,
};

/// Default OpenAI API base URL.
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI provider for chat completion models.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_API_URL.to_string(),
            default_model: "gpt-4o".to_string(),
        }
    }

    /// Create from environment variable.
    pub fn from_env() -> Option<Self> {
        std::env::var("OPENAI_API_KEY").ok().map(Self::new)
    }

    /// Set a custom base URL (for OpenRouter, Azure, local gateways, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the default model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Convert conversation turns to OpenAI format.
    fn format_messages(&self, turns: &[Turn]) -> Vec<OpenAIMessage> {
        turns.iter().map(convert_turn).collect()
    }

    /// Convert tools to OpenAI format.
    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<OpenAITool> {
        tools
            .iter()
            .map(|t| OpenAITool {
                tool_type: "function".to_string(),
                function: OpenAIFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn build_request(&self, request: &CompletionRequest) -> OpenAIRequest {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        OpenAIRequest {
            model,
            messages: self.format_messages(&request.messages),
            max_tokens: request.max_tokens,
            temperature: Some(request.temperature),
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(self.format_tools(&request.tools))
            },
            stream: true,
        }
    }
}

fn convert_turn(turn: &Turn) -> OpenAIMessage {
    let tool_calls = if turn.tool_calls.is_empty() {
        None
    } else {
        Some(
            turn.tool_calls
                .iter()
                .map(|tc| OpenAIToolCall {
                    id: tc.id.clone(),
                    tool_type: "function".to_string(),
                    function: OpenAIFunctionCall {
                        name: tc.name.clone(),
                        arguments: tc.arguments.clone(),
                    },
                })
                .collect(),
        )
    };

    OpenAIMessage {
        role: turn.role.as_str().to_string(),
        content: turn.content.clone(),
        tool_calls,
        tool_call_id: if turn.role == Role::Tool {
            turn.tool_call_id.clone()
        } else {
            None
        },
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn id(&self) -> &str {
        "openai"
    }

    fn name(&self) -> &str {
        "OpenAI"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    #[instrument(skip(self, request), fields(model = %request.model, turns = request.messages.len()))]
    async fn complete_stream(&self, request: CompletionRequest) -> anyhow::Result<FragmentStream> {
        let api_request = self.build_request(&request);

        debug!("Sending streaming request to OpenAI API");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError {
                provider: "openai".to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("OpenAI API error: {} - {}", status, error_text);
            return Err(ProviderError::api_error("openai", status.as_u16(), error_text).into());
        }

        let state = StreamState {
            bytes: response.bytes_stream(),
            parser: SseParser::new(),
            pending: VecDeque::new(),
            failure: None,
            done: false,
        };

        let fragments = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(fragment) = state.pending.pop_front() {
                    return Some((Ok(fragment), state));
                }
                if let Some(err) = state.failure.take() {
                    return Some((Err(err.into()), state));
                }
                if state.done {
                    return None;
                }

                match state.bytes.next().await {
                    Some(Ok(bytes)) => {
                        for event in state.parser.feed(&bytes) {
                            if event.is_done() {
                                state.done = true;
                                break;
                            }
                            if !state.absorb(&event.data) {
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        state.failure = Some(ProviderError::StreamError {
                            provider: "openai".to_string(),
                            message: e.to_string(),
                        });
                    }
                    None => {
                        state.done = true;
                        if let Some(event) = state.parser.finish() {
                            if !event.is_done() {
                                state.absorb(&event.data);
                            }
                        }
                    }
                }
            }
        });

        Ok(Box::pin(fragments))
    }
}

/// Decoding state carried between polls of the fragment stream.
struct StreamState<S> {
    bytes: S,
    parser: SseParser,
    /// One SSE event can carry several fragments; they are handed out one per poll.
    pending: VecDeque<Fragment>,
    /// Yielded after the fragments that preceded it.
    failure: Option<ProviderError>,
    done: bool,
}

impl<S> StreamState<S> {
    /// Queue the fragments of one event. Returns false once the stream has failed.
    fn absorb(&mut self, data: &str) -> bool {
        match parse_openai_event(data) {
            Ok(ParsedEvent::Fragments(fragments)) => {
                self.pending.extend(fragments);
                true
            }
            Ok(ParsedEvent::Failed(err)) => {
                error!("OpenAI stream reported an error: {}", err);
                self.failure = Some(err);
                self.done = true;
                false
            }
            Err(e) => {
                warn!("Failed to parse SSE event: {}", e);
                true
            }
        }
    }
}

/// What one OpenAI stream event carried.
#[derive(Debug)]
enum ParsedEvent {
    /// Fragments in wire order
    Fragments(Vec<Fragment>),
    /// An in-band `{"error": ...}` payload
    Failed(ProviderError),
}

/// Parse one OpenAI stream event.
fn parse_openai_event(data: &str) -> serde_json::Result<ParsedEvent> {
    let chunk: StreamChunkResponse = serde_json::from_str(data)?;
    let mut fragments = Vec::new();

    if let Some(error) = chunk.error {
        return Ok(ParsedEvent::Failed(ProviderError::StreamError {
            provider: "openai".to_string(),
            message: error.message,
        }));
    }

    for choice in chunk.choices {
        if let Some(delta) = choice.delta {
            if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                fragments.push(Fragment::TextDelta(content));
            }

            for tc in delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = match tc.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                fragments.push(Fragment::ToolCallDelta(ToolCallDelta {
                    index: tc.index,
                    id: tc.id,
                    name,
                    arguments,
                }));
            }
        }

        if let Some(reason) = choice.finish_reason {
            fragments.push(Fragment::Finish(FinishReason::from_wire(&reason)));
        }
    }

    Ok(ParsedEvent::Fragments(fragments))
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

// Streaming types

#[derive(Debug, Deserialize)]
struct StreamChunkResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbridge_core::ToolCallRequest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn fragments(data: &str) -> Vec<Fragment> {
        match parse_openai_event(data).unwrap() {
            ParsedEvent::Fragments(fragments) => fragments,
            ParsedEvent::Failed(e) => panic!("unexpected stream error: {}", e),
        }
    }

    fn simple_request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o".to_string(),
            messages: vec![Turn::system("sys"), Turn::user("hi")],
            temperature: 0.7,
            max_tokens: None,
            tools: Vec::new(),
        }
    }

    /// Answer one chat completion request with a canned SSE body.
    async fn serve_sse(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/v1", listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }

            let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        base_url
    }

    #[test]
    fn test_provider_metadata() {
        let provider = OpenAIProvider::new("test-key");
        assert_eq!(provider.id(), "openai");
        assert_eq!(provider.name(), "OpenAI");
        assert!(provider.is_configured());
        assert!(!OpenAIProvider::new("").is_configured());
    }

    #[test]
    fn test_custom_base_url() {
        let provider = OpenAIProvider::new("test-key").with_base_url("https://openrouter.ai/api/v1/");
        assert_eq!(provider.base_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn test_parse_text_delta() {
        assert_eq!(
            fragments(r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#),
            vec![Fragment::TextDelta("Hel".to_string())]
        );
    }

    #[test]
    fn test_parse_multiple_tool_call_deltas() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[
            {"index":0,"id":"call_a","type":"function","function":{"name":"web_search","arguments":""}},
            {"index":1,"function":{"arguments":"{\"q"}}
        ]}}]}"#;
        let fragments = fragments(data);
        assert_eq!(fragments.len(), 2);
        match &fragments[1] {
            Fragment::ToolCallDelta(delta) => {
                assert_eq!(delta.index, 1);
                assert!(delta.id.is_none());
                assert_eq!(delta.arguments.as_deref(), Some("{\"q"));
            }
            other => panic!("unexpected fragment {:?}", other),
        }
    }

    #[test]
    fn test_parse_finish_reason() {
        assert_eq!(
            fragments(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#),
            vec![Fragment::Finish(FinishReason::ToolCalls)]
        );
    }

    #[test]
    fn test_parse_error_payload() {
        match parse_openai_event(r#"{"error":{"message":"overloaded"}}"#).unwrap() {
            ParsedEvent::Failed(e) => assert!(e.to_string().contains("overloaded")),
            other => panic!("expected a stream error, got {:?}", other),
        }
        assert!(parse_openai_event("{not json").is_err());
    }

    #[tokio::test]
    async fn test_stream_yields_fragments_until_done() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
                    data: {not json}\n\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n\
                    data: [DONE]\n\n";
        let provider = OpenAIProvider::new("k").with_base_url(serve_sse(body).await);

        let items: Vec<_> = provider
            .complete_stream(simple_request())
            .await
            .unwrap()
            .collect()
            .await;
        let items: Vec<Fragment> = items.into_iter().map(|item| item.unwrap()).collect();
        assert_eq!(
            items,
            vec![
                Fragment::TextDelta("Hel".to_string()),
                Fragment::TextDelta("lo".to_string()),
                Fragment::Finish(FinishReason::Stop),
            ]
        );
    }

    #[tokio::test]
    async fn test_in_band_error_ends_stream_with_error() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n\
                    data: {\"error\":{\"message\":\"overloaded\"}}\n\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\" never\"}}]}\n\n\
                    data: [DONE]\n\n";
        let provider = OpenAIProvider::new("k").with_base_url(serve_sse(body).await);

        let items: Vec<_> = provider
            .complete_stream(simple_request())
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &Fragment::TextDelta("Hi".to_string()));
        let err = items[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn test_request_shape_with_tool_turns() {
        let provider = OpenAIProvider::new("k");
        let call = ToolCallRequest::new("call_1", "web_search", r#"{"query":"paris"}"#);
        let request = CompletionRequest {
            model: String::new(),
            messages: vec![
                Turn::system("sys"),
                Turn::user("weather?"),
                Turn::assistant_tool_calls(vec![call]),
                Turn::tool_result("call_1", "{}"),
            ],
            temperature: 0.7,
            max_tokens: None,
            tools: vec![ToolDefinition::new("web_search", "Search the web")],
        };

        let body = serde_json::to_value(provider.build_request(&request)).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][2]["content"], serde_json::Value::Null);
        assert_eq!(body["messages"][2]["tool_calls"][0]["function"]["arguments"], r#"{"query":"paris"}"#);
        assert_eq!(body["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["function"]["name"], "web_search");
        assert!(body.get("max_tokens").is_none());
    }
}
