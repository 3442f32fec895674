//! Active Conversation View
//!
//! Tracks which conversation the user has open and that conversation's
//! message timeline. The open id is a plain field, updated the moment the
//! user selects a conversation, so event routing never sees a stale value.
//!
//! Each open bumps a ticket. History responses carry the ticket they were
//! requested under and are dropped if the user has since moved on.

use std::collections::HashSet;

use crate::model::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewTicket(u64);

/// Result of offering an inbound message to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    Appended,
    /// Already in the timeline; first arrival wins.
    Duplicate,
    /// Belongs to a conversation that isn't open.
    NotOpen,
}

#[derive(Debug, Default)]
pub struct ActiveConversationView {
    open: Option<String>,
    timeline: Vec<Message>,
    seen: HashSet<String>,
    generation: u64,
    history_loaded: bool,
}

impl ActiveConversationView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_id(&self) -> Option<&str> {
        self.open.as_deref()
    }

    pub fn is_open(&self, conversation_id: &str) -> bool {
        self.open_id() == Some(conversation_id)
    }

    /// Switch to `conversation_id` with an empty timeline.
    pub fn open(&mut self, conversation_id: &str) -> ViewTicket {
        self.open = Some(conversation_id.to_string());
        self.timeline.clear();
        self.seen.clear();
        self.history_loaded = false;
        self.generation += 1;
        ViewTicket(self.generation)
    }

    pub fn close(&mut self) {
        self.open = None;
        self.timeline.clear();
        self.seen.clear();
        self.history_loaded = false;
        self.generation += 1;
    }

    pub fn is_current(&self, ticket: ViewTicket) -> bool {
        self.open.is_some() && ticket.0 == self.generation
    }

    /// Replace the timeline with fetched history. Messages pushed while the
    /// fetch was in flight and missing from it are kept after the history.
    /// Returns false, changing nothing, for a stale ticket.
    pub fn apply_history(&mut self, ticket: ViewTicket, history: Vec<Message>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }

        let pushed = std::mem::take(&mut self.timeline);
        self.seen.clear();
        for message in history.into_iter().chain(pushed) {
            if self.seen.insert(message.id.clone()) {
                self.timeline.push(message);
            }
        }
        self.history_loaded = true;
        true
    }

    pub fn apply_inbound(&mut self, message: Message) -> Append {
        if !self.is_open(&message.conversation_id) {
            return Append::NotOpen;
        }
        if !self.seen.insert(message.id.clone()) {
            return Append::Duplicate;
        }
        self.timeline.push(message);
        Append::Appended
    }

    /// Messages in arrival order.
    pub fn timeline(&self) -> &[Message] {
        &self.timeline
    }

    pub fn history_loaded(&self) -> bool {
        self.history_loaded
    }
}
