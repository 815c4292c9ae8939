//! # chatbridge-agent
//!
//! Streaming response orchestration for Chatbridge.
//!
//! This crate provides:
//! - The [`ChatClient`] seam to the hosted chat service
//! - Throttled stream accumulation and tool-call assembly
//! - Typing-indicator signals
//! - Cancellation of in-flight generations
//! - The agent lifecycle tying them together

pub mod accumulator;
pub mod agent;
pub mod cancellation;
pub mod chat;
pub mod indicator;
pub mod prompt;

pub use accumulator::{StreamAccumulator, StreamOutcome, TextSink, ToolCallAssembler};
pub use agent::{Agent, AgentBuilder, AgentConfig, AgentError, AgentResult, GENERIC_ERROR_TEXT};
pub use cancellation::{CancellationCoordinator, GenerationHandle};
pub use chat::{ChatClient, ChatError, Subscription, SubscriptionId};
pub use indicator::IndicatorSignaler;
