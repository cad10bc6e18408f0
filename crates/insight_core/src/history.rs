//! Bounded per-session conversation memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_MAX_HISTORY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct HistorySummary {
    pub message_count: usize,
    pub session_start: DateTime<Utc>,
    pub session_duration: chrono::Duration,
    pub session_id: Uuid,
}

/// Ordered question/answer log, capped at `2 * max_history` entries with
/// FIFO eviction. Owned by one session; never shared across sessions.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    max_history: usize,
    entries: Vec<ChatMessage>,
    session_start: DateTime<Utc>,
    session_id: Uuid,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl ConversationHistory {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            entries: Vec::new(),
            session_start: Utc::now(),
            session_id: Uuid::new_v4(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    /// Assemble the outgoing message list for a completion. The system
    /// message is included only at the start of a session (empty history),
    /// so it is never duplicated on follow-ups.
    pub fn build_messages(&self, system: Option<&str>, user: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.entries.len() + 2);
        if self.entries.is_empty() {
            if let Some(system) = system {
                messages.push(ChatMessage::system(system));
            }
        }
        let start = self.entries.len().saturating_sub(self.max_history * 2);
        messages.extend(self.entries[start..].iter().cloned());
        messages.push(ChatMessage::user(user));
        messages
    }

    /// Record one completed exchange, evicting the oldest entries once the
    /// cap is exceeded.
    pub fn push_exchange(&mut self, question: &str, answer: &str) {
        self.entries.push(ChatMessage::user(question));
        self.entries.push(ChatMessage::assistant(answer));
        let cap = self.max_history * 2;
        if self.entries.len() > cap {
            let excess = self.entries.len() - cap;
            self.entries.drain(..excess);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.session_start = Utc::now();
        self.session_id = Uuid::new_v4();
    }

    /// Drop the last exchange. Returns false when no full exchange exists.
    pub fn undo_last_exchange(&mut self) -> bool {
        if self.entries.len() >= 2 {
            self.entries.truncate(self.entries.len() - 2);
            true
        } else {
            false
        }
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            message_count: self.entries.len(),
            session_start: self.session_start,
            session_duration: Utc::now() - self.session_start,
            session_id: self.session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_evicts_oldest_first() {
        let mut h = ConversationHistory::new(2);
        for i in 0..5 {
            h.push_exchange(&format!("q{i}"), &format!("a{i}"));
        }
        assert_eq!(h.len(), 4);
        assert_eq!(h.entries()[0].content, "q3");
        assert_eq!(h.entries()[3].content, "a4");
    }

    #[test]
    fn undo_after_clear_fails() {
        let mut h = ConversationHistory::default();
        h.push_exchange("q", "a");
        h.clear();
        assert!(!h.undo_last_exchange());
    }

    #[test]
    fn undo_single_exchange_empties_history() {
        let mut h = ConversationHistory::default();
        h.push_exchange("q", "a");
        assert!(h.undo_last_exchange());
        assert!(h.is_empty());
        assert!(!h.undo_last_exchange());
    }

    #[test]
    fn system_message_only_on_empty_history() {
        let mut h = ConversationHistory::default();
        let first = h.build_messages(Some("sys"), "hello");
        assert_eq!(first[0].role, ChatRole::System);
        assert_eq!(first.len(), 2);

        h.push_exchange("hello", "hi");
        let second = h.build_messages(Some("sys"), "again");
        assert!(second.iter().all(|m| m.role != ChatRole::System));
        assert_eq!(second.len(), 3);
    }

    #[test]
    fn window_keeps_recent_exchanges() {
        let mut h = ConversationHistory::new(1);
        h.push_exchange("q0", "a0");
        h.push_exchange("q1", "a1");
        let msgs = h.build_messages(Some("sys"), "next");
        // Cap already trimmed to one exchange; no system on follow-up.
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].content, "q1");
    }
}
