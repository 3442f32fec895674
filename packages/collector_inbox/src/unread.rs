//! Unread counts and the badges that publish them.
//!
//! Counts are pure functions over a registry. A badge is a session-scoped
//! observable: the engine publishes after every mutation and any number of
//! subscribers read the latest value.

use tokio::sync::watch;

use crate::model::{Conversation, NotificationItem};
use crate::registry::{ConversationRegistry, NotificationFeed};

pub trait Unread {
    fn is_unread(&self) -> bool;
}

impl Unread for Conversation {
    fn is_unread(&self) -> bool {
        self.has_unread
    }
}

impl Unread for NotificationItem {
    fn is_unread(&self) -> bool {
        !self.is_read
    }
}

pub fn unread_count<'a, T, I>(items: I) -> usize
where
    T: Unread + 'a,
    I: IntoIterator<Item = &'a T>,
{
    items.into_iter().filter(|x| x.is_unread()).count()
}

pub fn conversation_unread(registry: &ConversationRegistry) -> usize {
    unread_count(registry.iter())
}

pub fn notification_unread(feed: &NotificationFeed) -> usize {
    unread_count(feed.iter())
}

/// Observable unread count.
#[derive(Debug)]
pub struct UnreadBadge {
    tx: watch::Sender<usize>,
}

impl UnreadBadge {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    /// Store a freshly computed count; subscribers are only woken on change.
    pub fn publish(&self, count: usize) {
        self.tx.send_if_modified(|current| {
            if *current == count {
                false
            } else {
                *current = count;
                true
            }
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }

    /// Back to zero, for session teardown.
    pub fn reset(&self) {
        self.publish(0);
    }
}

impl Default for UnreadBadge {
    fn default() -> Self {
        Self::new()
    }
}
