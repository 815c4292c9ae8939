//! Core agent implementation.
//!
//! The [`Agent`] connects a hosted chat service to a streaming model:
//!
//! ```text
//! Agent
//! ├── ChatClient (subscriptions, placeholder + partial updates)
//! ├── Provider (streamed completions)
//! ├── ToolRegistry (web search)
//! ├── ConversationBuffer (rolling history)
//! ├── IndicatorSignaler (thinking / generating / error / clear)
//! └── CancellationCoordinator (stop + dispose)
//! ```
//!
//! A generation runs one or more rounds against the provider on the same
//! placeholder message: each round that ends in tool calls appends the calls
//! and their results to the history and starts the next round.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatbridge_core::config::Config;
use chatbridge_core::{
    AiState, ConversationBuffer, EventKind, InboundEvent, MessageDraft, MessageIdentity,
    MessageNewEvent, PartialUpdate, StopGeneratingEvent, ToolCallRequest, Turn,
};
use chatbridge_providers::{CompletionRequest, Provider};
use chatbridge_tools::ToolRegistry;
use futures::future::join_all;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::accumulator::{StreamAccumulator, StreamOutcome, TextSink, DEFAULT_FLUSH_INTERVAL};
use crate::cancellation::{CancellationCoordinator, GenerationHandle};
use crate::chat::{ChatClient, ChatError, Subscription, SubscriptionId};
use crate::indicator::IndicatorSignaler;
use crate::prompt;

/// Message text used when a failed generation has no error text of its own.
pub const GENERIC_ERROR_TEXT: &str = "Error generating the message";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during agent operations.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Error from the AI provider.
    #[error("Provider error: {0}")]
    Provider(#[from] anyhow::Error),

    /// Error from the chat service.
    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    /// The model kept asking for tools.
    #[error("Stopped after {0} consecutive tool-call rounds")]
    ToolRoundsExceeded(usize),

    /// The agent has been disposed.
    #[error("Agent has been disposed")]
    Disposed,

    /// Agent not properly configured.
    #[error("Not configured: {0}")]
    NotConfigured(String),
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier to use.
    pub model: String,
    /// Temperature for generation.
    pub temperature: f32,
    /// Maximum tokens per response.
    pub max_tokens: Option<u32>,
    /// Non-system turns kept in the conversation buffer.
    pub history_window: usize,
    /// Minimum time between partial message updates.
    pub flush_interval: Duration,
    /// Maximum consecutive tool-call rounds per message.
    pub max_tool_rounds: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            max_tokens: None,
            history_window: chatbridge_core::conversation::DEFAULT_HISTORY_WINDOW,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_tool_rounds: 5,
        }
    }
}

impl From<&Config> for AgentConfig {
    fn from(config: &Config) -> Self {
        Self {
            model: config.model.model.clone(),
            temperature: config.model.temperature,
            max_tokens: config.model.max_tokens,
            history_window: config.agent.history_window,
            flush_interval: Duration::from_millis(config.agent.flush_interval_ms),
            max_tool_rounds: config.agent.max_tool_rounds,
        }
    }
}

// ============================================================================
// Message Writer
// ============================================================================

/// Writes accumulated text into one chat message.
struct MessageWriter {
    chat: Arc<dyn ChatClient>,
    message_id: String,
}

#[async_trait]
impl TextSink for MessageWriter {
    async fn write(&self, text: String) -> Result<(), ChatError> {
        self.chat
            .update_message(&self.message_id, PartialUpdate::text(text))
            .await
    }
}

// ============================================================================
// Agent
// ============================================================================

struct AgentInner {
    chat: Arc<dyn ChatClient>,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    indicator: IndicatorSignaler,
    coordinator: CancellationCoordinator,
    config: AgentConfig,
    buffer: Mutex<ConversationBuffer>,
    /// Ids of the two live subscriptions.
    subscriptions: Mutex<Vec<SubscriptionId>>,
    /// Subscriptions created by `init`, taken by `run`.
    pending: Mutex<Option<(Subscription, Subscription)>>,
    initialized: AtomicBool,
    disposed: AtomicBool,
    shutdown: CancellationToken,
}

/// The chat bridge agent.
///
/// Cloning is cheap; clones share the same conversation and active set.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    /// Create a new agent with all dependencies.
    pub fn new(
        chat: Arc<dyn ChatClient>,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        let buffer =
            ConversationBuffer::with_window(prompt::system_prompt(None), config.history_window);

        Self {
            inner: Arc::new(AgentInner {
                indicator: IndicatorSignaler::new(Arc::clone(&chat)),
                chat,
                provider,
                tools,
                coordinator: CancellationCoordinator::new(),
                config,
                buffer: Mutex::new(buffer),
                subscriptions: Mutex::new(Vec::new()),
                pending: Mutex::new(None),
                initialized: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Get a reference to the configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    /// Whether `init` has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Whether the agent has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Snapshot of the conversation, system prompt first.
    pub fn history(&self) -> Vec<Turn> {
        self.inner.buffer.lock().turns().to_vec()
    }

    /// Number of generations currently in flight.
    pub fn active_generations(&self) -> usize {
        self.inner.coordinator.active_count()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Validate credentials, set the system prompt and subscribe to events.
    ///
    /// A missing model credential is fatal. Calling `init` again after it
    /// succeeded does nothing.
    pub fn init(&self) -> AgentResult<()> {
        let inner = &self.inner;
        if self.is_disposed() {
            return Err(AgentError::Disposed);
        }
        if !inner.provider.is_configured() {
            return Err(AgentError::NotConfigured(format!(
                "{} API key is missing",
                inner.provider.name()
            )));
        }
        if inner.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        inner
            .buffer
            .lock()
            .replace_system_prompt(Turn::system(prompt::system_prompt(None)));

        let messages = inner.chat.subscribe(EventKind::MessageNew);
        let stops = inner.chat.subscribe(EventKind::StopGenerating);
        inner.subscriptions.lock().extend([messages.id, stops.id]);
        *inner.pending.lock() = Some((messages, stops));

        info!(
            provider = inner.provider.id(),
            model = %inner.config.model,
            tools = inner.tools.len(),
            "Agent initialized"
        );
        Ok(())
    }

    /// Drive the subscriptions until the agent is disposed.
    ///
    /// Each inbound message runs on its own task, so generations for
    /// different messages may overlap. Stop requests are handled inline.
    pub async fn run(&self) -> AgentResult<()> {
        if self.is_disposed() {
            return Err(AgentError::Disposed);
        }
        let (mut messages, mut stops) = self
            .inner
            .pending
            .lock()
            .take()
            .ok_or_else(|| AgentError::NotConfigured("init must succeed before run".into()))?;

        let mut generations = JoinSet::new();
        loop {
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                event = messages.events.recv() => match event {
                    Some(InboundEvent::MessageNew(event)) => {
                        let agent = self.clone();
                        generations.spawn(async move { agent.handle_message(event).await });
                    }
                    Some(other) => debug!(kind = other.kind().as_str(), "Ignoring unexpected event"),
                    None => break,
                },
                event = stops.events.recv() => match event {
                    Some(InboundEvent::StopGenerating(event)) => self.handle_stop_generating(event).await,
                    Some(other) => debug!(kind = other.kind().as_str(), "Ignoring unexpected event"),
                    None => break,
                },
                Some(joined) = generations.join_next(), if !generations.is_empty() => {
                    log_join(joined);
                }
            }
        }

        while let Some(joined) = generations.join_next().await {
            log_join(joined);
        }
        debug!("Agent event loop finished");
        Ok(())
    }

    /// Handle a `message.new` event, running the whole generation.
    #[instrument(skip(self, event), fields(message_id = %event.message.id))]
    pub async fn handle_message(&self, event: MessageNewEvent) {
        let inner = &self.inner;
        if !self.is_initialized() || self.is_disposed() {
            debug!("Ignoring message: agent not ready");
            return;
        }
        let Some(text) = event.text() else {
            debug!("Ignoring message without text");
            return;
        };
        if event.message.ai_generated {
            debug!("Ignoring agent-generated message");
            return;
        }
        let Some(channel_id) = event.channel_id() else {
            warn!("Ignoring message without a channel id");
            return;
        };

        {
            let mut buffer = inner.buffer.lock();
            if let Some(task) = event.message.custom.writing_task.as_deref() {
                buffer.replace_system_prompt(Turn::system(prompt::system_prompt(Some(task))));
            }
            buffer.append(Turn::user(text));
            buffer.trim();
        }

        let identity = match inner
            .chat
            .create_message(channel_id, MessageDraft::placeholder())
            .await
        {
            Ok(identity) => identity,
            Err(e) => {
                error!(channel = channel_id, "Failed to create placeholder message: {}", e);
                return;
            }
        };

        let handle = inner.coordinator.register_active(identity);
        if self.is_stopped(&handle) {
            inner.coordinator.retire(&handle);
            return;
        }

        info!(message = %handle.identity(), "Generating response");
        self.signal(&handle, AiState::Thinking).await;
        self.signal(&handle, AiState::Generating).await;
        self.generate(handle).await;
    }

    /// Handle an `ai_indicator.stop` event.
    ///
    /// Only a stop for a message this agent is generating has any effect; it
    /// cancels every active generation and clears each stopped message's
    /// indicator once.
    pub async fn handle_stop_generating(&self, event: StopGeneratingEvent) {
        if self.is_disposed() {
            return;
        }
        let Some(message_id) = event.message_id.as_deref() else {
            debug!("Ignoring stop without a message id");
            return;
        };
        let stopped = self.inner.coordinator.stop_for(message_id);
        if stopped.is_empty() {
            debug!(message_id, "Ignoring stop for untracked message");
            return;
        }

        info!(message_id, stopped = stopped.len(), "Generation stopped by user");
        for identity in &stopped {
            self.inner.indicator.clear(identity).await;
        }
    }

    /// Tear the agent down. Safe to call more than once.
    pub async fn dispose(&self) -> AgentResult<()> {
        let inner = &self.inner;
        if inner.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let ids = std::mem::take(&mut *inner.subscriptions.lock());
        for id in ids {
            inner.chat.unsubscribe(id);
        }
        inner.pending.lock().take();

        let stopped = inner.coordinator.close();
        inner.shutdown.cancel();
        info!(stopped, "Agent disposed");

        inner.chat.disconnect().await?;
        Ok(())
    }

    // ========================================================================
    // Generation
    // ========================================================================

    /// Run rounds until the model answers, fails, or is stopped.
    ///
    /// Every terminal outcome retires the handle first. Only the caller that
    /// actually retires it may signal, so a stop racing the end of a
    /// generation never produces a second clear.
    async fn generate(&self, mut handle: GenerationHandle) {
        let inner = &self.inner;
        let mut tool_rounds = 0;

        loop {
            match self.stream_round(&handle).await {
                Ok(StreamOutcome::Completed { text }) => {
                    if self.finish(&handle) {
                        {
                            let mut buffer = inner.buffer.lock();
                            buffer.append(Turn::assistant(text));
                            buffer.trim();
                        }
                        inner.indicator.clear(handle.identity()).await;
                        debug!(message = %handle.identity(), "Generation complete");
                    }
                    return;
                }
                Ok(StreamOutcome::ToolCalls { calls, .. }) => {
                    tool_rounds += 1;
                    if tool_rounds > inner.config.max_tool_rounds {
                        let err = AgentError::ToolRoundsExceeded(inner.config.max_tool_rounds);
                        warn!(message = %handle.identity(), "{}", err);
                        if self.finish(&handle) {
                            self.handle_stream_error(&err.to_string(), handle.identity())
                                .await;
                        }
                        return;
                    }
                    match self.handle_tool_calls(calls, handle).await {
                        Some(next) => handle = next,
                        None => return,
                    }
                }
                Ok(StreamOutcome::Cancelled) => {
                    debug!(message = %handle.identity(), "Generation cancelled");
                    inner.coordinator.retire(&handle);
                    return;
                }
                Err(e) => {
                    if self.finish(&handle) {
                        error!(message = %handle.identity(), "Generation failed: {:#}", e);
                        self.handle_stream_error(&e.to_string(), handle.identity())
                            .await;
                    }
                    return;
                }
            }
        }
    }

    /// Retire a generation that reached a terminal outcome. Returns true if
    /// this call retired it and the outcome should still be reported.
    fn finish(&self, handle: &GenerationHandle) -> bool {
        let retired = self.inner.coordinator.retire(handle);
        retired && !self.is_stopped(handle)
    }

    /// Stream one completion round into the placeholder message.
    async fn stream_round(&self, handle: &GenerationHandle) -> anyhow::Result<StreamOutcome> {
        let inner = &self.inner;
        let request = {
            let buffer = inner.buffer.lock();
            CompletionRequest {
                model: inner.config.model.clone(),
                messages: buffer.turns().to_vec(),
                temperature: inner.config.temperature,
                max_tokens: inner.config.max_tokens,
                tools: inner.tools.definitions(),
            }
        };

        let stream = tokio::select! {
            biased;
            _ = handle.token().cancelled() => return Ok(StreamOutcome::Cancelled),
            stream = inner.provider.complete_stream(request) => stream?,
        };

        let sink: Arc<dyn TextSink> = Arc::new(MessageWriter {
            chat: Arc::clone(&inner.chat),
            message_id: handle.identity().message_id.clone(),
        });
        let mut accumulator = StreamAccumulator::new(inner.config.flush_interval);
        accumulator.consume(stream, handle.token(), sink).await
    }

    /// Run the requested tools, record the round, and hand back the handle
    /// for the next round. Returns `None` if the generation was stopped.
    async fn handle_tool_calls(
        &self,
        requests: Vec<ToolCallRequest>,
        handle: GenerationHandle,
    ) -> Option<GenerationHandle> {
        let inner = &self.inner;
        info!(
            message = %handle.identity(),
            tools = ?requests.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            "Running tool calls"
        );

        let results = tokio::select! {
            biased;
            _ = handle.token().cancelled() => None,
            results = join_all(requests.iter().map(|call| inner.tools.invoke(call))) => Some(results),
        };
        let Some(results) = results.filter(|_| !self.is_stopped(&handle)) else {
            inner.coordinator.retire(&handle);
            return None;
        };

        for (call, result) in requests.iter().zip(&results) {
            debug!(tool = %call.name, call_id = %call.id, bytes = result.len(), "Tool result");
        }
        {
            let mut buffer = inner.buffer.lock();
            buffer.append(Turn::assistant_tool_calls(requests.clone()));
            for (call, result) in requests.iter().zip(results) {
                buffer.append(Turn::tool_result(call.id.clone(), result));
            }
            buffer.trim();
        }

        // Register the next round before retiring this one so a stop never
        // finds the message untracked.
        let next = inner.coordinator.register_active(handle.identity().clone());
        inner.coordinator.retire(&handle);
        if handle.is_cancelled() || next.is_cancelled() {
            next.token().cancel();
            inner.coordinator.retire(&next);
            return None;
        }
        Some(next)
    }

    /// Surface a failed generation in the placeholder message.
    async fn handle_stream_error(&self, message: &str, identity: &MessageIdentity) {
        if self.is_disposed() {
            return;
        }
        self.inner.indicator.update(identity, AiState::Error).await;

        let text = if message.trim().is_empty() {
            GENERIC_ERROR_TEXT
        } else {
            message
        };
        if let Err(e) = self
            .inner
            .chat
            .update_message(&identity.message_id, PartialUpdate::text(text))
            .await
        {
            warn!(message = %identity, "Failed to write error text: {}", e);
        }
    }

    fn is_stopped(&self, handle: &GenerationHandle) -> bool {
        self.is_disposed() || handle.is_cancelled()
    }

    async fn signal(&self, handle: &GenerationHandle, state: AiState) {
        if !self.is_stopped(handle) {
            self.inner.indicator.update(handle.identity(), state).await;
        }
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("Generation task panicked: {}", e);
        }
    }
}

// ============================================================================
// Agent Builder
// ============================================================================

/// Builder for constructing an [`Agent`].
pub struct AgentBuilder {
    chat: Option<Arc<dyn ChatClient>>,
    provider: Option<Arc<dyn Provider>>,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            chat: None,
            provider: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    /// Set the chat client.
    pub fn chat(mut self, chat: Arc<dyn ChatClient>) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Set the AI provider.
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the tools offered to the model.
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Set the model to use.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set the temperature.
    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.temperature = temp;
        self
    }

    /// Set the history window.
    pub fn history_window(mut self, window: usize) -> Self {
        self.config.history_window = window;
        self
    }

    /// Set the minimum time between partial message updates.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    /// Set the maximum consecutive tool-call rounds.
    pub fn max_tool_rounds(mut self, max: usize) -> Self {
        self.config.max_tool_rounds = max;
        self
    }

    /// Set the full configuration.
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the agent.
    ///
    /// Returns an error if required components are missing.
    pub fn build(self) -> AgentResult<Agent> {
        let chat = self
            .chat
            .ok_or_else(|| AgentError::NotConfigured("chat client is required".into()))?;
        let provider = self
            .provider
            .ok_or_else(|| AgentError::NotConfigured("provider is required".into()))?;

        Ok(Agent::new(chat, provider, Arc::new(self.tools), self.config))
    }
}

// ============================================================================
// Tests
// ============================================================================
