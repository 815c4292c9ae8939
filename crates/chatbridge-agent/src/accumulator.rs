//! Stream accumulation with throttled message updates.
//!
//! [`StreamAccumulator`] consumes a provider's fragment stream, keeps the
//! running text, assembles tool calls, and pushes the accumulated text into
//! the chat message at most once per flush interval.
//!
//! Partial flushes are fire-and-forget: they are handed to a background
//! worker that writes only the newest pending text, in order, so a slow chat
//! service never stalls the stream. The final flush is awaited after the
//! worker has drained.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatbridge_core::ToolCallRequest;
use chatbridge_providers::{FinishReason, Fragment, ToolCallDelta};
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::chat::ChatError;

/// Default minimum time between partial flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(1000);

/// Destination for accumulated text.
#[async_trait]
pub trait TextSink: Send + Sync {
    /// Replace the destination's text with `text`.
    async fn write(&self, text: String) -> Result<(), ChatError>;
}

/// How a consumed stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The stream ran to completion and the final text was flushed.
    Completed { text: String },
    /// The model asked for tools; no final flush was made.
    ToolCalls {
        text: String,
        calls: Vec<ToolCallRequest>,
    },
    /// The generation was cancelled; nothing further was written.
    Cancelled,
}

// ============================================================================
// Tool Call Assembly
// ============================================================================

/// Assembles tool calls from streaming deltas, keyed by call index.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: BTreeMap<usize, PartialToolCall>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta to the call at its index.
    pub fn apply_delta(&mut self, delta: &ToolCallDelta) {
        let call = self.calls.entry(delta.index).or_default();

        if let Some(id) = &delta.id {
            call.id.push_str(id);
        }
        if let Some(name) = &delta.name {
            call.name.push_str(name);
        }
        if let Some(args) = &delta.arguments {
            call.arguments.push_str(args);
        }
    }

    /// Whether any delta has been seen.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Take the assembled calls in index order.
    ///
    /// Calls that never received a name are dropped.
    pub fn build(&mut self) -> Vec<ToolCallRequest> {
        std::mem::take(&mut self.calls)
            .into_iter()
            .filter_map(|(index, partial)| {
                if partial.name.is_empty() {
                    warn!(index, "Dropping tool call without a name");
                    return None;
                }
                let id = if partial.id.is_empty() {
                    format!("call_{}", index)
                } else {
                    partial.id
                };
                Some(ToolCallRequest::new(id, partial.name, partial.arguments))
            })
            .collect()
    }
}

// ============================================================================
// Flush Scheduling
// ============================================================================

/// Decides when accumulated text is due for a partial flush.
#[derive(Debug)]
struct FlushThrottle {
    interval: Duration,
    last_flush: Instant,
}

impl FlushThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_flush: Instant::now(),
        }
    }

    fn reset(&mut self) {
        self.last_flush = Instant::now();
    }

    fn ready(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_flush) >= self.interval {
            self.last_flush = now;
            true
        } else {
            false
        }
    }
}

/// Background writer for partial flushes.
///
/// Only the newest pending text is written; older pending text is replaced.
/// Dropping the worker aborts any write still in flight.
struct FlushWorker {
    tx: Option<watch::Sender<Option<String>>>,
    handle: JoinHandle<()>,
}

impl FlushWorker {
    fn spawn(sink: Arc<dyn TextSink>) -> Self {
        let (tx, mut rx) = watch::channel::<Option<String>>(None);

        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let pending = rx.borrow_and_update().clone();
                if let Some(text) = pending {
                    if let Err(e) = sink.write(text).await {
                        warn!("Partial flush failed: {}", e);
                    }
                }
            }
        });

        Self {
            tx: Some(tx),
            handle,
        }
    }

    fn push(&self, text: String) {
        if let Some(tx) = &self.tx {
            tx.send_replace(Some(text));
        }
    }

    /// Drop pending text and wait for an in-flight write to land.
    async fn finish(&mut self) {
        if let Some(tx) = self.tx.take() {
            tx.send_replace(None);
        }
        if let Err(e) = (&mut self.handle).await {
            if !e.is_cancelled() {
                warn!("Flush worker failed: {}", e);
            }
        }
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ============================================================================
// Stream Accumulator
// ============================================================================

/// Accumulates one generation round.
#[derive(Debug)]
pub struct StreamAccumulator {
    text: String,
    tool_calls: ToolCallAssembler,
    throttle: FlushThrottle,
    partial_flushes: usize,
}

impl Default for StreamAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_INTERVAL)
    }
}

impl StreamAccumulator {
    /// Create an accumulator flushing at most once per `flush_interval`.
    pub fn new(flush_interval: Duration) -> Self {
        Self {
            text: String::new(),
            tool_calls: ToolCallAssembler::new(),
            throttle: FlushThrottle::new(flush_interval),
            partial_flushes: 0,
        }
    }

    /// Text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of partial flushes scheduled so far.
    pub fn partial_flushes(&self) -> usize {
        self.partial_flushes
    }

    /// Consume a fragment stream until it ends, asks for tools, fails, or
    /// `token` is cancelled.
    ///
    /// Cancellation is observed between fragments and while waiting for the
    /// next one; once it fires nothing more is written to `sink`.
    pub async fn consume<S>(
        &mut self,
        mut stream: S,
        token: &CancellationToken,
        sink: Arc<dyn TextSink>,
    ) -> anyhow::Result<StreamOutcome>
    where
        S: Stream<Item = anyhow::Result<Fragment>> + Unpin + Send,
    {
        self.throttle.reset();
        let mut flusher = FlushWorker::spawn(Arc::clone(&sink));
        let mut requested_tools = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(chars = self.text.len(), "Generation cancelled mid-stream");
                    return Ok(StreamOutcome::Cancelled);
                }
                next = stream.next() => next,
            };

            let fragment = match next {
                Some(Ok(fragment)) => fragment,
                Some(Err(e)) => return Err(e),
                None => break,
            };

            match fragment {
                Fragment::TextDelta(delta) => {
                    self.text.push_str(&delta);
                    if self.throttle.ready() {
                        flusher.push(self.text.clone());
                        self.partial_flushes += 1;
                    }
                }
                Fragment::ToolCallDelta(delta) => self.tool_calls.apply_delta(&delta),
                Fragment::Finish(FinishReason::ToolCalls) => {
                    requested_tools = true;
                    break;
                }
                Fragment::Finish(reason) => {
                    debug!(?reason, "Model finished");
                }
            }
        }

        let drained = tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = flusher.finish() => true,
        };
        if !drained || token.is_cancelled() {
            return Ok(StreamOutcome::Cancelled);
        }

        let calls = self.tool_calls.build();
        if !calls.is_empty() {
            if !requested_tools {
                debug!("Stream ended with tool calls but no tool_calls finish reason");
            }
            return Ok(StreamOutcome::ToolCalls {
                text: std::mem::take(&mut self.text),
                calls,
            });
        }

        sink.write(self.text.clone()).await?;
        debug!(
            chars = self.text.len(),
            partial_flushes = self.partial_flushes,
            "Final flush"
        );

        Ok(StreamOutcome::Completed {
            text: std::mem::take(&mut self.text),
        })
    }
}
