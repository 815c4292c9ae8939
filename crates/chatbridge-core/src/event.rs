//! Chat event types exchanged with the hosted chat service.
//!
//! Field names follow the chat service's wire format, so these types
//! deserialize straight from its JSON payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of the chat message a generation writes into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageIdentity {
    /// Channel id (`cid`)
    pub channel_id: String,
    /// Message id
    pub message_id: String,
}

impl MessageIdentity {
    /// Create a new message identity.
    pub fn new(channel_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            message_id: message_id.into(),
        }
    }
}

impl fmt::Display for MessageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel_id, self.message_id)
    }
}

/// Inbound event kinds the bridge subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `message.new`
    MessageNew,
    /// `ai_indicator.stop`
    StopGenerating,
}

impl EventKind {
    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessageNew => "message.new",
            EventKind::StopGenerating => "ai_indicator.stop",
        }
    }
}

/// Custom fields attached to a chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCustom {
    /// Optional writing-task context hint
    #[serde(rename = "writingTask", default, skip_serializing_if = "Option::is_none")]
    pub writing_task: Option<String>,
}

/// A chat message as carried by `message.new`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message id
    pub id: String,
    /// Message text
    #[serde(default)]
    pub text: Option<String>,
    /// Whether the message was produced by an AI agent
    #[serde(default)]
    pub ai_generated: bool,
    /// Custom fields
    #[serde(default)]
    pub custom: MessageCustom,
    /// Channel id
    #[serde(default)]
    pub cid: Option<String>,
}

/// Payload of a `message.new` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageNewEvent {
    /// Channel id of the event
    #[serde(default)]
    pub cid: Option<String>,
    /// The new message
    pub message: InboundMessage,
}

impl MessageNewEvent {
    /// Channel the message belongs to, preferring the message's own `cid`.
    pub fn channel_id(&self) -> Option<&str> {
        self.message.cid.as_deref().or(self.cid.as_deref())
    }

    /// Non-empty message text.
    pub fn text(&self) -> Option<&str> {
        self.message.text.as_deref().filter(|t| !t.is_empty())
    }
}

/// Payload of an `ai_indicator.stop` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopGeneratingEvent {
    /// Message whose generation should stop
    #[serde(default)]
    pub message_id: Option<String>,
    /// Channel id
    #[serde(default)]
    pub cid: Option<String>,
}

/// An inbound event delivered to a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    #[serde(rename = "message.new")]
    MessageNew(MessageNewEvent),
    #[serde(rename = "ai_indicator.stop")]
    StopGenerating(StopGeneratingEvent),
}

impl InboundEvent {
    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::MessageNew(_) => EventKind::MessageNew,
            InboundEvent::StopGenerating(_) => EventKind::StopGenerating,
        }
    }
}

/// AI state reported through `ai_indicator.update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiState {
    #[serde(rename = "AI_STATE_THINKING")]
    Thinking,
    #[serde(rename = "AI_STATE_GENERATING")]
    Generating,
    #[serde(rename = "AI_STATE_ERROR")]
    Error,
}

/// Outbound indicator events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundEvent {
    #[serde(rename = "ai_indicator.update")]
    Update {
        ai_state: AiState,
        cid: String,
        message_id: String,
    },
    #[serde(rename = "ai_indicator.clear")]
    Clear { cid: String, message_id: String },
}

impl OutboundEvent {
    /// Build an update event for a message.
    pub fn update(identity: &MessageIdentity, ai_state: AiState) -> Self {
        OutboundEvent::Update {
            ai_state,
            cid: identity.channel_id.clone(),
            message_id: identity.message_id.clone(),
        }
    }

    /// Build a clear event for a message.
    pub fn clear(identity: &MessageIdentity) -> Self {
        OutboundEvent::Clear {
            cid: identity.channel_id.clone(),
            message_id: identity.message_id.clone(),
        }
    }

    /// Message the event targets.
    pub fn message_id(&self) -> &str {
        match self {
            OutboundEvent::Update { message_id, .. } | OutboundEvent::Clear { message_id, .. } => {
                message_id
            }
        }
    }
}

/// A message to create in a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDraft {
    /// Initial text
    pub text: String,
    /// Flag marking agent-generated messages
    pub ai_generated: bool,
}

impl MessageDraft {
    /// An empty agent-generated placeholder.
    pub fn placeholder() -> Self {
        Self {
            text: String::new(),
            ai_generated: true,
        }
    }
}

/// Partial update body: `{set: {text}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialUpdate {
    pub set: PartialUpdateFields,
}

/// Fields set by a partial update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialUpdateFields {
    pub text: String,
}

impl PartialUpdate {
    /// Set the message text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            set: PartialUpdateFields { text: text.into() },
        }
    }
}
