//! Typing-indicator signals for the message being generated.

use std::sync::Arc;

use chatbridge_core::{AiState, MessageIdentity, OutboundEvent};
use tracing::{debug, warn};

use crate::chat::ChatClient;

/// Emits `ai_indicator.update` / `ai_indicator.clear` events.
///
/// Indicators are cosmetic: delivery failures are logged and never surfaced
/// to the generation that triggered them.
#[derive(Clone)]
pub struct IndicatorSignaler {
    chat: Arc<dyn ChatClient>,
}

impl IndicatorSignaler {
    /// Create a signaler sending through the given client.
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self { chat }
    }

    /// Report the agent's state for a message.
    pub async fn update(&self, identity: &MessageIdentity, state: AiState) {
        debug!(message = %identity, ?state, "Indicator update");
        if let Err(e) = self.chat.send_event(OutboundEvent::update(identity, state)).await {
            warn!(message = %identity, "Failed to send indicator update: {}", e);
        }
    }

    /// Clear the indicator for a message.
    pub async fn clear(&self, identity: &MessageIdentity) {
        debug!(message = %identity, "Indicator clear");
        if let Err(e) = self.chat.send_event(OutboundEvent::clear(identity)).await {
            warn!(message = %identity, "Failed to clear indicator: {}", e);
        }
    }
}
