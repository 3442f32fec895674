//! Registries: the single-writer stores behind the inbox and the feed.

pub mod conversations;
pub mod notifications;

pub use conversations::{
    ConversationEffect, ConversationRegistry, ConversationSignal, RoutingContext, UnreadState,
};
pub use notifications::{NotificationEffect, NotificationFeed, NotificationSignal, Route};
