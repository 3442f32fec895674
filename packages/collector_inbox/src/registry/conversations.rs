//! Conversation Registry
//!
//! The canonical, deduplicated, ordered list of the user's conversations and
//! their unread flags. All mutation goes through [`ConversationRegistry::process`],
//! which applies one [`ConversationSignal`] and returns the side effects the
//! caller must carry out (room joins, mark-read/unread calls, detail fetches).
//!
//! Merges are commutative and idempotent: a snapshot and a push event for the
//! same conversation produce the same state whichever is applied first.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use tracing::debug;

use crate::model::Conversation;

/// Per-conversation unread state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreadState {
    Unknown,
    SyncedRead,
    SyncedUnread,
}

/// Inputs to the registry.
#[derive(Debug, Clone)]
pub enum ConversationSignal {
    /// Full or partial list fetched from the server. `as_of` is when the
    /// request was issued, not when the response landed.
    Snapshot {
        conversations: Vec<Conversation>,
        as_of: DateTime<Utc>,
    },
    /// A pushed message for `conversation_id` was received at `at`.
    Inbound {
        conversation_id: String,
        sender_id: String,
        at: DateTime<Utc>,
    },
    /// The user opened this conversation.
    Opened {
        conversation_id: String,
        at: DateTime<Utc>,
    },
    /// The server created a conversation on our behalf (first message or
    /// open-by-target). Only the conversation's own `last_message_at` moves
    /// it in the ordering.
    Created {
        conversation: Conversation,
        at: DateTime<Utc>,
    },
    /// The server confirmed a message we sent.
    Sent {
        conversation_id: String,
        at: DateTime<Utc>,
    },
    /// Fetched details for a conversation first seen in a push event.
    Details { conversation: Conversation },
}

/// Side effects requested by the registry. The registry never performs I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEffect {
    JoinRoom(String),
    MarkRead(String),
    MarkUnread(String),
    FetchDetails(String),
}

/// Synchronous routing inputs, read at the moment the signal is applied.
#[derive(Debug, Clone, Copy)]
pub struct RoutingContext<'a> {
    pub self_id: &'a str,
    pub open: Option<&'a str>,
}

#[derive(Debug, Clone)]
struct Entry {
    conversation: Conversation,
    /// Discovery order, used to break ordering ties.
    discovered: u64,
    /// Time of the last locally applied unread-state change.
    local_stamp: Option<DateTime<Utc>>,
    /// True until a snapshot or detail fetch fills in the participants.
    materialized: bool,
}

#[derive(Debug, Default)]
pub struct ConversationRegistry {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one signal and return the effects it requires.
    pub fn process(
        &mut self,
        signal: ConversationSignal,
        ctx: &RoutingContext<'_>,
    ) -> Vec<ConversationEffect> {
        let mut effects = Vec::new();

        match signal {
            ConversationSignal::Snapshot { conversations, as_of } => {
                debug!(count = conversations.len(), "merging conversation snapshot");
                for incoming in conversations {
                    effects.push(ConversationEffect::JoinRoom(incoming.id.clone()));
                    self.merge_snapshot_entry(incoming, as_of, ctx);
                }
            }

            ConversationSignal::Inbound {
                conversation_id,
                sender_id,
                at,
            } => {
                let idx = self.ensure(&conversation_id, &mut effects);
                let is_open = ctx.open == Some(conversation_id.as_str());
                let entry = &mut self.entries[idx];
                bump_last_message(&mut entry.conversation, at);

                if is_open {
                    // Being viewed: stays read, nothing to tell the server
                } else if sender_id != ctx.self_id {
                    entry.conversation.has_unread = true;
                    entry.local_stamp = Some(at);
                    effects.push(ConversationEffect::MarkUnread(conversation_id));
                }
                // Else: echo of our own send from another tab, timestamp only
            }

            ConversationSignal::Opened {
                conversation_id,
                at,
            } => {
                let idx = self.ensure(&conversation_id, &mut effects);
                let entry = &mut self.entries[idx];
                entry.conversation.has_unread = false;
                entry.local_stamp = Some(at);
                effects.push(ConversationEffect::MarkRead(conversation_id));
            }

            ConversationSignal::Created { conversation, at } => {
                effects.push(ConversationEffect::JoinRoom(conversation.id.clone()));
                let idx = match self.position(&conversation.id) {
                    Some(idx) => idx,
                    None => self.insert(Conversation::placeholder(conversation.id.clone())),
                };
                let entry = &mut self.entries[idx];
                fill_details(&mut entry.conversation, &conversation);
                entry.materialized = false;
                entry.conversation.has_unread = false;
                entry.local_stamp = Some(at);
                if let Some(last) = conversation.last_message_at {
                    bump_last_message(&mut entry.conversation, last);
                }
            }

            ConversationSignal::Sent {
                conversation_id,
                at,
            } => {
                let idx = self.ensure(&conversation_id, &mut effects);
                bump_last_message(&mut self.entries[idx].conversation, at);
            }

            ConversationSignal::Details { conversation } => {
                let idx = self.ensure(&conversation.id, &mut effects);
                // Details never carry unread authority
                effects.retain(|e| !matches!(e, ConversationEffect::FetchDetails(_)));
                let entry = &mut self.entries[idx];
                fill_details(&mut entry.conversation, &conversation);
                entry.materialized = false;
                if let Some(last) = conversation.last_message_at {
                    bump_last_message(&mut entry.conversation, last);
                }
            }
        }

        self.sort();
        effects
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.position(id).map(|idx| &self.entries[idx].conversation)
    }

    pub fn state(&self, id: &str) -> UnreadState {
        match self.get(id) {
            None => UnreadState::Unknown,
            Some(c) if c.has_unread => UnreadState::SyncedUnread,
            Some(_) => UnreadState::SyncedRead,
        }
    }

    /// Ids of entries created from a push event whose details have not
    /// arrived yet, in display order.
    pub fn pending_details(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.materialized)
            .map(|e| e.conversation.id.clone())
            .collect()
    }

    /// Conversations in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.entries.iter().map(|e| &e.conversation)
    }

    pub fn ids(&self) -> Vec<String> {
        self.iter().map(|c| c.id.clone()).collect()
    }

    pub fn to_vec(&self) -> Vec<Conversation> {
        self.iter().cloned().collect()
    }

    pub fn find_by_article(&self, article_id: &str) -> Option<&Conversation> {
        self.iter().find(|c| c.article_id == article_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.conversation.id == id)
    }

    fn insert(&mut self, conversation: Conversation) -> usize {
        let discovered = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry {
            conversation,
            discovered,
            local_stamp: None,
            materialized: false,
        });
        self.entries.len() - 1
    }

    /// Index of `id`, materializing a placeholder if it is unknown.
    fn ensure(&mut self, id: &str, effects: &mut Vec<ConversationEffect>) -> usize {
        if let Some(idx) = self.position(id) {
            return idx;
        }
        debug!(conversation_id = %id, "materializing unknown conversation");
        let idx = self.insert(Conversation::placeholder(id));
        self.entries[idx].materialized = true;
        effects.push(ConversationEffect::JoinRoom(id.to_string()));
        effects.push(ConversationEffect::FetchDetails(id.to_string()));
        idx
    }

    fn merge_snapshot_entry(
        &mut self,
        incoming: Conversation,
        as_of: DateTime<Utc>,
        ctx: &RoutingContext<'_>,
    ) {
        let is_open = ctx.open == Some(incoming.id.as_str());
        match self.position(&incoming.id) {
            None => {
                let mut conversation = incoming;
                if is_open {
                    conversation.has_unread = false;
                }
                self.insert(conversation);
            }
            Some(idx) => {
                let entry = &mut self.entries[idx];
                let local_is_newer = entry.local_stamp.is_some_and(|stamp| stamp > as_of);
                if !local_is_newer && !is_open {
                    entry.conversation.has_unread = incoming.has_unread;
                }
                if let Some(last) = incoming.last_message_at {
                    bump_last_message(&mut entry.conversation, last);
                }
                fill_details(&mut entry.conversation, &incoming);
                entry.materialized = false;
            }
        }
    }

    /// `lastMessageAt` descending; untimestamped entries last; discovery
    /// order breaks ties.
    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            match (
                a.conversation.last_message_at,
                b.conversation.last_message_at,
            ) {
                (Some(x), Some(y)) => y.cmp(&x).then(a.discovered.cmp(&b.discovered)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.discovered.cmp(&b.discovered),
            }
        });
    }
}

fn bump_last_message(conversation: &mut Conversation, at: DateTime<Utc>) {
    if conversation.last_message_at.is_none_or(|last| at > last) {
        conversation.last_message_at = Some(at);
    }
}

/// Copy server-owned descriptive fields, keeping what we have where the
/// source is blank.
fn fill_details(target: &mut Conversation, source: &Conversation) {
    fn take(dst: &mut String, src: &str) {
        if !src.is_empty() {
            *dst = src.to_string();
        }
    }
    take(&mut target.article_id, &source.article_id);
    take(&mut target.shop_id, &source.shop_id);
    take(&mut target.buyer_id, &source.buyer_id);
    take(&mut target.seller_id, &source.seller_id);
    if source.article_title.is_some() {
        target.article_title = source.article_title.clone();
    }
    if source.shop_name.is_some() {
        target.shop_name = source.shop_name.clone();
    }
}
