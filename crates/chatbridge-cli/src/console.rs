//! A chat client backed by the terminal.
//!
//! Lines typed by the user become `message.new` events on a single channel,
//! and the agent's placeholder message is rendered by printing only the text
//! each partial update appends.

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chatbridge_agent::{ChatClient, ChatError, Subscription, SubscriptionId};
use chatbridge_core::event::MessageCustom;
use chatbridge_core::{
    AiState, EventKind, InboundEvent, InboundMessage, MessageDraft, MessageIdentity,
    MessageNewEvent, OutboundEvent, PartialUpdate, StopGeneratingEvent,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

type Subscriber = (SubscriptionId, EventKind, mpsc::UnboundedSender<InboundEvent>);

/// Terminal implementation of [`ChatClient`].
pub struct ConsoleChat {
    channel_id: String,
    next_subscription: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
    /// Text already printed per agent message still being written
    rendered: Mutex<HashMap<String, String>>,
    /// Messages whose next update is their final error text
    failed: Mutex<HashSet<String>>,
    last_ai_message: Mutex<Option<String>>,
    connected: AtomicBool,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleChat {
    /// Create a console chat printing to stdout.
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self::with_writer(channel_id, Box::new(io::stdout()))
    }

    /// Create a console chat printing to `out`.
    pub fn with_writer(channel_id: impl Into<String>, out: Box<dyn Write + Send>) -> Self {
        Self {
            channel_id: channel_id.into(),
            next_subscription: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
            rendered: Mutex::new(HashMap::new()),
            failed: Mutex::new(HashSet::new()),
            last_ai_message: Mutex::new(None),
            connected: AtomicBool::new(true),
            out: Mutex::new(out),
        }
    }

    /// Channel all messages are posted to.
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Post a user message. Returns how many subscribers received it.
    pub fn send_user_message(&self, text: &str, writing_task: Option<String>) -> usize {
        self.publish(InboundEvent::MessageNew(MessageNewEvent {
            cid: Some(self.channel_id.clone()),
            message: InboundMessage {
                id: Uuid::new_v4().to_string(),
                text: Some(text.to_string()),
                ai_generated: false,
                custom: MessageCustom { writing_task },
                cid: Some(self.channel_id.clone()),
            },
        }))
    }

    /// Ask the agent to stop writing its latest message.
    ///
    /// Returns false when no agent message exists yet.
    pub fn stop_generating(&self) -> bool {
        let Some(message_id) = self.last_ai_message.lock().clone() else {
            return false;
        };
        self.publish(InboundEvent::StopGenerating(StopGeneratingEvent {
            message_id: Some(message_id),
            cid: Some(self.channel_id.clone()),
        }));
        true
    }

    fn publish(&self, event: InboundEvent) -> usize {
        let kind = event.kind();
        let subscribers = self.subscribers.lock();
        subscribers
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .filter(|(_, _, tx)| tx.send(event.clone()).is_ok())
            .count()
    }

    fn ensure_connected(&self) -> Result<(), ChatError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ChatError::Disconnected)
        }
    }

    fn print(&self, text: &str) -> Result<(), ChatError> {
        let mut out = self.out.lock();
        out.write_all(text.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|e| ChatError::Request(e.to_string()))
    }
}

#[async_trait]
impl ChatClient for ConsoleChat {
    fn subscribe(&self, kind: EventKind) -> Subscription {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        let (tx, events) = mpsc::unbounded_channel();
        self.subscribers.lock().push((id, kind, tx));
        debug!(id, kind = kind.as_str(), "Subscribed");
        Subscription { id, events }
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().retain(|(sid, _, _)| *sid != id);
        debug!(id, "Unsubscribed");
    }

    async fn create_message(
        &self,
        channel_id: &str,
        draft: MessageDraft,
    ) -> Result<MessageIdentity, ChatError> {
        self.ensure_connected()?;
        let message_id = Uuid::new_v4().to_string();

        self.rendered
            .lock()
            .insert(message_id.clone(), draft.text.clone());
        if draft.ai_generated {
            *self.last_ai_message.lock() = Some(message_id.clone());
        }

        self.print(&format!("\nassistant> {}", draft.text))?;
        Ok(MessageIdentity::new(channel_id, message_id))
    }

    async fn update_message(&self, message_id: &str, update: PartialUpdate) -> Result<(), ChatError> {
        self.ensure_connected()?;
        let text = update.set.text;

        if self.failed.lock().remove(message_id) {
            return self.print(&format!("\nassistant> {}", text));
        }

        let output = {
            let mut rendered = self.rendered.lock();
            let previous = rendered
                .get_mut(message_id)
                .ok_or_else(|| ChatError::MessageNotFound(message_id.to_string()))?;

            let output = match text.strip_prefix(previous.as_str()) {
                Some(appended) => appended.to_string(),
                // Rewritten rather than extended, e.g. replaced by an error
                None => format!("\nassistant> {}", text),
            };
            *previous = text;
            output
        };

        if output.is_empty() {
            return Ok(());
        }
        self.print(&output)
    }

    async fn send_event(&self, event: OutboundEvent) -> Result<(), ChatError> {
        self.ensure_connected()?;
        match event {
            OutboundEvent::Update {
                ai_state: AiState::Error,
                message_id,
                ..
            } => {
                if self.rendered.lock().remove(&message_id).is_some() {
                    self.failed.lock().insert(message_id);
                }
                self.print("\n[error]")
            }
            OutboundEvent::Update { ai_state, .. } => {
                debug!(?ai_state, "Agent state");
                Ok(())
            }
            OutboundEvent::Clear { message_id, .. } => {
                self.rendered.lock().remove(&message_id);
                self.print("\n\n")
            }
        }
    }

    async fn disconnect(&self) -> Result<(), ChatError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.subscribers.lock().clear();
            debug!("Console chat disconnected");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Writer sharing its buffer with the test.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).to_string()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn console() -> (ConsoleChat, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let chat = ConsoleChat::with_writer("messaging:console", Box::new(buffer.clone()));
        (chat, buffer)
    }

    #[tokio::test]
    async fn test_user_message_reaches_subscriber() {
        let (chat, _) = console();
        let mut messages = chat.subscribe(EventKind::MessageNew);
        let _stops = chat.subscribe(EventKind::StopGenerating);

        assert_eq!(chat.send_user_message("hello", Some("Essay".into())), 1);

        let Some(InboundEvent::MessageNew(event)) = messages.events.recv().await else {
            panic!("expected message.new");
        };
        assert_eq!(event.text(), Some("hello"));
        assert_eq!(event.channel_id(), Some("messaging:console"));
        assert!(!event.message.ai_generated);
        assert_eq!(event.message.custom.writing_task.as_deref(), Some("Essay"));
    }

    #[tokio::test]
    async fn test_updates_print_only_appended_text() {
        let (chat, out) = console();
        let identity = chat
            .create_message("messaging:console", MessageDraft::placeholder())
            .await
            .unwrap();

        chat.update_message(&identity.message_id, PartialUpdate::text("Hello"))
            .await
            .unwrap();
        chat.update_message(&identity.message_id, PartialUpdate::text("Hello, world"))
            .await
            .unwrap();
        chat.update_message(&identity.message_id, PartialUpdate::text("Hello, world"))
            .await
            .unwrap();

        assert_eq!(out.contents(), "\nassistant> Hello, world");
    }

    #[tokio::test]
    async fn test_rewrite_prints_whole_text() {
        let (chat, out) = console();
        let identity = chat
            .create_message("messaging:console", MessageDraft::placeholder())
            .await
            .unwrap();

        chat.update_message(&identity.message_id, PartialUpdate::text("Partial ans"))
            .await
            .unwrap();
        chat.send_event(OutboundEvent::update(&identity, AiState::Error))
            .await
            .unwrap();
        chat.update_message(&identity.message_id, PartialUpdate::text("timeout"))
            .await
            .unwrap();

        assert!(out.contents().ends_with("[error]\nassistant> timeout"));
    }

    #[tokio::test]
    async fn test_finished_messages_are_forgotten() {
        let (chat, _) = console();
        let done = chat
            .create_message("messaging:console", MessageDraft::placeholder())
            .await
            .unwrap();
        let failed = chat
            .create_message("messaging:console", MessageDraft::placeholder())
            .await
            .unwrap();

        chat.send_event(OutboundEvent::clear(&done)).await.unwrap();
        chat.send_event(OutboundEvent::update(&failed, AiState::Error))
            .await
            .unwrap();
        chat.update_message(&failed.message_id, PartialUpdate::text("timeout"))
            .await
            .unwrap();

        assert!(chat.rendered.lock().is_empty());
        assert!(chat.failed.lock().is_empty());
        for identity in [&done, &failed] {
            let err = chat
                .update_message(&identity.message_id, PartialUpdate::text("late"))
                .await
                .unwrap_err();
            assert_eq!(err, ChatError::MessageNotFound(identity.message_id.clone()));
        }
    }

    #[tokio::test]
    async fn test_update_unknown_message_fails() {
        let (chat, _) = console();
        let err = chat
            .update_message("missing", PartialUpdate::text("x"))
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::MessageNotFound("missing".into()));
    }

    #[tokio::test]
    async fn test_stop_targets_latest_agent_message() {
        let (chat, _) = console();
        let mut stops = chat.subscribe(EventKind::StopGenerating);
        assert!(!chat.stop_generating());

        let identity = chat
            .create_message("messaging:console", MessageDraft::placeholder())
            .await
            .unwrap();
        assert!(chat.stop_generating());

        let Some(InboundEvent::StopGenerating(event)) = stops.events.recv().await else {
            panic!("expected ai_indicator.stop");
        };
        assert_eq!(event.message_id, Some(identity.message_id));
    }

    #[tokio::test]
    async fn test_disconnect_closes_subscriptions() {
        let (chat, _) = console();
        let mut messages = chat.subscribe(EventKind::MessageNew);

        chat.disconnect().await.unwrap();
        chat.disconnect().await.unwrap();

        assert!(messages.events.recv().await.is_none());
        assert_eq!(chat.send_user_message("anyone?", None), 0);
        assert_eq!(
            chat.create_message("messaging:console", MessageDraft::placeholder())
                .await
                .unwrap_err(),
            ChatError::Disconnected
        );
    }
}
