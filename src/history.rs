//! Received message history

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::fmt;

/// One received message
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub received_at: DateTime<Local>,
    pub text: String,
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.received_at.format("%H:%M:%S"), self.text)
    }
}

/// Bounded, newest-first list of received messages
#[derive(Debug)]
pub struct MessageHistory {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
}

impl MessageHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit.min(1024)),
            limit: limit.max(1),
        }
    }

    /// Record a message, trimmed. Blank messages are skipped.
    pub fn push(&mut self, payload: &str) -> Option<&HistoryEntry> {
        self.push_at(payload, Local::now())
    }

    fn push_at(&mut self, payload: &str, received_at: DateTime<Local>) -> Option<&HistoryEntry> {
        let text = payload.trim();
        if text.is_empty() {
            return None;
        }

        self.entries.push_front(HistoryEntry {
            received_at,
            text: text.to_string(),
        });
        self.entries.truncate(self.limit);
        self.entries.front()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    /// Entries, newest first
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
