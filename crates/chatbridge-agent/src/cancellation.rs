//! Tracking and cancelling in-flight generations.
//!
//! Every generation registers a [`GenerationHandle`] before it starts
//! streaming and retires it when it ends. A stop request for any tracked
//! message cancels every active generation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chatbridge_core::MessageIdentity;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// An active generation's registration.
#[derive(Debug)]
pub struct GenerationHandle {
    id: u64,
    identity: MessageIdentity,
    token: CancellationToken,
}

impl GenerationHandle {
    /// Message the generation writes into.
    pub fn identity(&self) -> &MessageIdentity {
        &self.identity
    }

    /// Token cancelled when the generation must stop.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the generation has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Default)]
struct Registry {
    active: HashMap<u64, (MessageIdentity, CancellationToken)>,
    closed: bool,
}

impl Registry {
    fn cancel_all(&mut self) -> usize {
        self.drain_cancelled().len()
    }

    /// Cancel and untrack everything, returning each message once.
    fn drain_cancelled(&mut self) -> Vec<MessageIdentity> {
        let mut stopped: Vec<MessageIdentity> = Vec::new();
        for (_, (identity, token)) in self.active.drain() {
            token.cancel();
            if !stopped.iter().any(|s| s.message_id == identity.message_id) {
                stopped.push(identity);
            }
        }
        stopped
    }
}

/// Set of active generations.
#[derive(Default)]
pub struct CancellationCoordinator {
    next_id: AtomicU64,
    registry: Mutex<Registry>,
}

impl CancellationCoordinator {
    /// Create an empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generation for a message.
    ///
    /// After [`close`](Self::close) the returned handle is already cancelled.
    pub fn register_active(&self, identity: MessageIdentity) -> GenerationHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let mut registry = self.registry.lock();
        if registry.closed {
            token.cancel();
        } else {
            registry
                .active
                .insert(id, (identity.clone(), token.clone()));
        }

        GenerationHandle {
            id,
            identity,
            token,
        }
    }

    /// Stop tracking a generation. Returns false if it was not tracked.
    pub fn retire(&self, handle: &GenerationHandle) -> bool {
        self.registry.lock().active.remove(&handle.id).is_some()
    }

    /// Cancel every active generation and stop tracking them.
    pub fn stop_all(&self) -> usize {
        let stopped = self.registry.lock().cancel_all();
        if stopped > 0 {
            debug!(stopped, "Cancelled active generations");
        }
        stopped
    }

    /// If `message_id` belongs to an active generation, cancel everything.
    ///
    /// Returns every stopped message once, the requested one first, or an
    /// empty list when `message_id` is not tracked. Concurrent callers for
    /// the same message see a match at most once.
    pub fn stop_for(&self, message_id: &str) -> Vec<MessageIdentity> {
        let mut registry = self.registry.lock();
        if !registry
            .active
            .values()
            .any(|(identity, _)| identity.message_id == message_id)
        {
            return Vec::new();
        }

        let mut stopped = registry.drain_cancelled();
        if let Some(pos) = stopped.iter().position(|i| i.message_id == message_id) {
            stopped[..=pos].rotate_right(1);
        }
        debug!(message_id, stopped = stopped.len(), "Stop requested");
        stopped
    }

    /// Whether any active generation writes into `message_id`.
    pub fn is_tracking(&self, message_id: &str) -> bool {
        self.registry
            .lock()
            .active
            .values()
            .any(|(identity, _)| identity.message_id == message_id)
    }

    /// Number of active generations.
    pub fn active_count(&self) -> usize {
        self.registry.lock().active.len()
    }

    /// Cancel everything and refuse further registrations.
    pub fn close(&self) -> usize {
        let mut registry = self.registry.lock();
        registry.closed = true;
        registry.cancel_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(message_id: &str) -> MessageIdentity {
        MessageIdentity::new("messaging:general", message_id)
    }

    #[test]
    fn test_register_and_retire() {
        let coordinator = CancellationCoordinator::new();
        let handle = coordinator.register_active(identity("ai-1"));

        assert!(coordinator.is_tracking("ai-1"));
        assert_eq!(coordinator.active_count(), 1);

        assert!(coordinator.retire(&handle));
        assert!(!coordinator.retire(&handle));
        assert!(!coordinator.is_tracking("ai-1"));
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn test_stop_all_cancels_every_generation() {
        let coordinator = CancellationCoordinator::new();
        let a = coordinator.register_active(identity("ai-1"));
        let b = coordinator.register_active(identity("ai-2"));

        assert_eq!(coordinator.stop_all(), 2);
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert_eq!(coordinator.active_count(), 0);
        assert_eq!(coordinator.stop_all(), 0);
    }

    #[test]
    fn test_stop_for_untracked_message_does_nothing() {
        let coordinator = CancellationCoordinator::new();
        let handle = coordinator.register_active(identity("ai-1"));

        assert!(coordinator.stop_for("someone-else").is_empty());
        assert!(!handle.is_cancelled());
        assert_eq!(coordinator.active_count(), 1);
    }

    #[test]
    fn test_stop_for_matches_once() {
        let coordinator = CancellationCoordinator::new();
        let a = coordinator.register_active(identity("ai-1"));
        let b = coordinator.register_active(identity("ai-2"));

        let stopped = coordinator.stop_for("ai-2");
        assert_eq!(stopped, vec![identity("ai-2"), identity("ai-1")]);
        assert!(a.is_cancelled() && b.is_cancelled());
        assert!(coordinator.stop_for("ai-2").is_empty());
    }

    #[test]
    fn test_stop_for_reports_each_message_once() {
        let coordinator = CancellationCoordinator::new();
        // A tool-round handoff briefly tracks the same message twice
        let first = coordinator.register_active(identity("ai-1"));
        let second = coordinator.register_active(identity("ai-1"));

        assert_eq!(coordinator.stop_for("ai-1"), vec![identity("ai-1")]);
        assert!(first.is_cancelled() && second.is_cancelled());
        assert_eq!(coordinator.active_count(), 0);
    }

    #[test]
    fn test_close_rejects_new_registrations() {
        let coordinator = CancellationCoordinator::new();
        let before = coordinator.register_active(identity("ai-1"));

        assert_eq!(coordinator.close(), 1);
        assert!(before.is_cancelled());

        let after = coordinator.register_active(identity("ai-2"));
        assert!(after.is_cancelled());
        assert!(!coordinator.is_tracking("ai-2"));
    }
}
