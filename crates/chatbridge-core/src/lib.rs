//! # chatbridge-core
//!
//! Core types and abstractions for Chatbridge - a bridge between a hosted
//! chat service and a streaming LLM completion API.
//!
//! This crate provides:
//! - Conversation turns and the bounded conversation buffer
//! - Tool definitions and tool-call request types
//! - Chat event types (inbound, outbound) and message identities
//! - Configuration system
//! - Common error types

pub mod config;
pub mod conversation;
pub mod error;
pub mod event;
pub mod message;
pub mod tool;

pub use config::Config;
pub use conversation::ConversationBuffer;
pub use error::{Error, Result};
pub use event::{
    AiState, EventKind, InboundEvent, InboundMessage, MessageDraft, MessageIdentity, MessageNewEvent,
    OutboundEvent, PartialUpdate, StopGeneratingEvent,
};
pub use message::{Role, Turn};
pub use tool::{ToolCallRequest, ToolDefinition};
