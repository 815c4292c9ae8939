//! Bounded conversation history.
//!
//! The buffer always starts with the current system prompt, followed by at
//! most `window` trailing turns. Trimming keeps element 0 and the most recent
//! `window` turns in insertion order.

use crate::message::{Role, Turn};

/// Default number of non-system turns kept in context.
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// Ordered, bounded conversation history owned by one agent.
#[derive(Debug, Clone)]
pub struct ConversationBuffer {
    turns: Vec<Turn>,
    window: usize,
}

impl ConversationBuffer {
    /// Create a buffer seeded with a system prompt.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self::with_window(system_prompt, DEFAULT_HISTORY_WINDOW)
    }

    /// Create a buffer with a custom window size.
    pub fn with_window(system_prompt: impl Into<String>, window: usize) -> Self {
        Self {
            turns: vec![Turn::system(system_prompt)],
            window,
        }
    }

    /// Append a turn at the end of the history.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Replace the system prompt wholesale.
    pub fn replace_system_prompt(&mut self, turn: Turn) {
        debug_assert_eq!(turn.role, Role::System);
        self.turns[0] = turn;
    }

    /// Drop the oldest non-system turns beyond the window.
    ///
    /// Tool results left at the front without the assistant turn that
    /// requested them are dropped too.
    pub fn trim(&mut self) {
        let excess = self.turns.len().saturating_sub(1 + self.window);
        if excess > 0 {
            self.turns.drain(1..1 + excess);
        }
        let orphaned = self.turns[1..]
            .iter()
            .take_while(|t| t.role == Role::Tool)
            .count();
        if orphaned > 0 {
            self.turns.drain(1..1 + orphaned);
        }
    }

    /// All turns, system prompt first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The current system prompt.
    pub fn system_prompt(&self) -> &Turn {
        &self.turns[0]
    }

    /// Number of turns including the system prompt.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True when only the system prompt is present.
    pub fn is_empty(&self) -> bool {
        self.turns.len() <= 1
    }

    /// Window size.
    pub fn window(&self) -> usize {
        self.window
    }
}
