//! Push Channel Protocol
//!
//! Every frame on the push channel is a JSON text frame of the form
//! `{"event": "<name>", "data": {...}}`, in both directions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;
use crate::model::{NotificationItem, NotificationKind, NotificationPayload, WireMessage};

pub const NEW_MESSAGE: &str = "newMessage";
pub const NEW_ARTICLE_INTEREST: &str = "new_article_interest";
pub const JOIN_CONVERSATION: &str = "joinConversation";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Events the server pushes to us.
#[derive(Debug, Clone)]
pub enum PushEvent {
    NewMessage(WireMessage),
    ArticleInterest(ArticleInterest),
    /// Anything we don't consume. Kept so it can be logged.
    Other { event: String },
}

impl PushEvent {
    pub fn decode(text: &str) -> Result<Self, SyncError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        Ok(match envelope.event.as_str() {
            NEW_MESSAGE => PushEvent::NewMessage(serde_json::from_value(envelope.data)?),
            NEW_ARTICLE_INTEREST => {
                PushEvent::ArticleInterest(serde_json::from_value(envelope.data)?)
            }
            _ => PushEvent::Other {
                event: envelope.event,
            },
        })
    }

    pub fn name(&self) -> &str {
        match self {
            PushEvent::NewMessage(_) => NEW_MESSAGE,
            PushEvent::ArticleInterest(_) => NEW_ARTICLE_INTEREST,
            PushEvent::Other { event } => event,
        }
    }
}

/// Payload of `new_article_interest`: an article matching the user's
/// interests was published.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleInterest {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "article_id")]
    pub article_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ArticleInterest {
    /// Materialize as an unread notification. Events missing an id or an
    /// article id cannot be routed and are dropped.
    pub fn into_notification(self, received_at: DateTime<Utc>) -> Option<NotificationItem> {
        if self.id.is_empty() || self.article_id.is_empty() {
            return None;
        }
        Some(NotificationItem {
            id: self.id,
            kind: NotificationKind::NewArticle,
            is_read: false,
            article_id: Some(self.article_id.clone()),
            created_at: self.created_at.unwrap_or(received_at),
            payload: NotificationPayload {
                article_id: Some(self.article_id),
                title: self.title,
                ..Default::default()
            },
        })
    }
}

/// Commands we send to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    JoinConversation { conversation_id: String },
}

impl OutboundCommand {
    pub fn encode(&self) -> Result<String, SyncError> {
        let envelope = match self {
            OutboundCommand::JoinConversation { conversation_id } => Envelope {
                event: JOIN_CONVERSATION.to_string(),
                data: serde_json::json!({ "conversationId": conversation_id }),
            },
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}
