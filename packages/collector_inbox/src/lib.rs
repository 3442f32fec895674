//! Collector Inbox - client-side real-time sync for Collector.shop
//!
//! Keeps a signed-in user's conversation inbox and notification feed
//! consistent across three sources that race each other: REST snapshots,
//! events pushed over the realtime channel, and the user's own actions.
//!
//! ```text
//!  REST API ──snapshots──┐
//!                        ├──► SyncEngine ──► ConversationRegistry ──► unread badge
//!  push channel ─events──┤        │      └─► NotificationFeed     ──► unread badge
//!                        │        └────────► ActiveConversationView
//!  SyncHandle ──commands─┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use collector_inbox::{CollectorConfig, Session, SessionCredentials, SyncConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CollectorConfig::new(None)?;
//!     let file = config.file_config()?;
//!     let credentials = SessionCredentials::from_file(&file.session)?;
//!
//!     let session = Session::start(&SyncConfig::from_file(&file), credentials)?;
//!     let inbox = session.handle();
//!
//!     let mut unread = inbox.conversation_unread();
//!     unread.changed().await?;
//!     println!("{} unread conversations", *unread.borrow());
//!
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod unread;
pub mod view;

#[cfg(test)]
mod test_helpers;

pub use api::{ConversationTarget, HttpInboxApi, InboxApi};
pub use channel::{ChannelEvent, ChannelHandle, RealtimeChannel};
pub use config::{CollectorConfig, SessionCredentials, SyncConfig};
pub use engine::{InboxSnapshot, SyncEngine, SyncHandle};
pub use error::SyncError;
pub use metrics::{MetricsSnapshot, SyncMetrics};
pub use model::{Conversation, Message, NotificationItem, NotificationKind};
pub use registry::Route;
pub use session::Session;
