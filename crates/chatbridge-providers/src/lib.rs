//! # chatbridge-providers
//!
//! Streaming model provider abstraction for Chatbridge.
//!
//! This crate provides:
//! - [`Provider`] trait for streaming completion backends
//! - Typed response [`Fragment`]s (text delta, tool-call delta, finish)
//! - An OpenAI-compatible chat completions implementation
//! - A byte-buffered SSE parser

pub mod openai;
pub mod sse;
pub mod traits;

pub use openai::OpenAIProvider;
pub use traits::{
    CompletionRequest, FinishReason, Fragment, FragmentStream, Provider, ToolCallDelta,
};
