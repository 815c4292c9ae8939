//! The seam between the agent and the hosted chat service.
//!
//! The agent never talks to a concrete chat SDK. Everything it needs (event
//! subscriptions, placeholder creation, partial updates, indicator events)
//! goes through [`ChatClient`], so tests and the console front end can supply
//! their own implementations.

use async_trait::async_trait;
use chatbridge_core::{
    EventKind, InboundEvent, MessageDraft, MessageIdentity, OutboundEvent, PartialUpdate,
};
use thiserror::Error;
use tokio::sync::mpsc;

/// Handle identifying a live subscription.
pub type SubscriptionId = u64;

/// A live subscription to one kind of inbound event.
///
/// The receiver yields `None` once the subscription is removed or the client
/// disconnects.
#[derive(Debug)]
pub struct Subscription {
    /// Id to pass to [`ChatClient::unsubscribe`]
    pub id: SubscriptionId,
    /// Events of the subscribed kind
    pub events: mpsc::UnboundedReceiver<InboundEvent>,
}

/// Errors reported by a chat client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The client is no longer connected.
    #[error("Chat client is disconnected")]
    Disconnected,

    /// The targeted message does not exist.
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// The chat service rejected or failed the request.
    #[error("Chat request failed: {0}")]
    Request(String),
}

/// Connected client for the hosted chat service.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Subscribe to one kind of inbound event.
    fn subscribe(&self, kind: EventKind) -> Subscription;

    /// Remove a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Create a message in a channel and return its identity.
    async fn create_message(
        &self,
        channel_id: &str,
        draft: MessageDraft,
    ) -> Result<MessageIdentity, ChatError>;

    /// Apply a partial update to an existing message.
    async fn update_message(&self, message_id: &str, update: PartialUpdate) -> Result<(), ChatError>;

    /// Send an event into a channel.
    async fn send_event(&self, event: OutboundEvent) -> Result<(), ChatError>;

    /// Disconnect the client.
    async fn disconnect(&self) -> Result<(), ChatError>;
}
